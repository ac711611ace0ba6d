//! Index mappings: where they come from and how they get applied.
//!
//! - [`MappingGenerator`]: produces the field mapping for a record type
//! - [`IndexCreationCoordinator`]: creates each index exactly once, then
//!   applies mappings

pub mod coordinator;

pub use coordinator::{CreationPhase, IndexCreationCoordinator};

use serde_json::Value;

use crate::error::SyncError;

/// Produces the field-type mapping document for one record type.
pub trait MappingGenerator: Send + Sync {
    fn generate_mapping(&self) -> Result<Value, SyncError>;
}

/// A fixed, hand-written mapping.
#[derive(Debug, Clone)]
pub struct StaticMapping(pub Value);

impl MappingGenerator for StaticMapping {
    fn generate_mapping(&self) -> Result<Value, SyncError> {
        Ok(self.0.clone())
    }
}

impl Default for StaticMapping {
    fn default() -> Self {
        Self(serde_json::json!({ "properties": {} }))
    }
}
