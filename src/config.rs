//! Configuration for a sync engine instance.
//!
//! One [`SyncConfig`] describes one record type and the index it is mirrored
//! into. Everything except `model_name` has a default.
//!
//! # Example
//!
//! ```
//! use search_sync::SyncConfig;
//!
//! let config = SyncConfig::new("Book");
//! assert_eq!(config.index_name(), "books");
//! assert_eq!(config.type_name(), "book");
//! assert!(config.bulk.is_none());
//!
//! // Bulk may be given as `false`, `true` or `{size, delay_ms}`
//! let config: SyncConfig = serde_json::from_str(
//!     r#"{"model_name": "Book", "index": "library", "bulk": {"size": 50}}"#,
//! ).unwrap();
//! assert_eq!(config.index_name(), "library");
//! assert_eq!(config.bulk.unwrap().size, 50);
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::storage::traits::QueryModifier;

/// Identity path every query-level update can always be resolved on.
pub const ID_PATH: &str = "_id";

/// Batching thresholds for the operation buffer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkConfig {
    /// Flush once the live batch holds this many wire entries
    #[serde(default = "default_bulk_size")]
    pub size: usize,
    /// Flush this many milliseconds after the first unflushed submit
    #[serde(default = "default_bulk_delay_ms")]
    pub delay_ms: u64,
}

impl BulkConfig {
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            size: default_bulk_size(),
            delay_ms: default_bulk_delay_ms(),
        }
    }
}

/// Configuration for one record type ↔ index pairing.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Record type name; index and type names derive from it when unset
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Index name (default: lowercase model name + "s")
    #[serde(default)]
    pub index: Option<String>,

    /// Mapping type name (default: lowercase model name)
    #[serde(default, alias = "type")]
    pub type_name: Option<String>,

    /// Always hydrate search results from the primary store
    #[serde(default)]
    pub hydrate: bool,

    /// Query modifiers applied, in order, to the hydration query
    #[serde(default)]
    pub hydrate_options: Vec<QueryModifier>,

    /// Route lifecycle writes through the operation buffer (`None` = immediate writes)
    #[serde(default, deserialize_with = "deserialize_bulk")]
    pub bulk: Option<BulkConfig>,

    /// Record paths used to rebuild identity from a query-level update
    #[serde(default)]
    pub identifying_paths: Vec<String>,

    /// Record path whose value becomes the backend routing value
    #[serde(default)]
    pub route_path: Option<String>,

    /// Conflict retries the backend performs for update operations
    #[serde(default = "default_retry_on_conflict")]
    pub retry_on_conflict: u32,

    /// Retries for a delete that reports "not found"
    #[serde(default = "default_delete_tries")]
    pub delete_tries: u32,

    /// Fixed wait between delete retries
    #[serde(default = "default_delete_backoff_ms")]
    pub delete_backoff_ms: u64,

    /// Poll interval while a backfill waits for in-flight work to drain
    #[serde(default = "default_backfill_close_poll_ms")]
    pub backfill_close_poll_ms: u64,

    /// High watermark = factor × bulk size
    #[serde(default = "default_backfill_high_watermark_factor")]
    pub backfill_high_watermark_factor: usize,

    /// Upper bound on records re-indexed after a query-level update
    #[serde(default = "default_requery_limit")]
    pub requery_limit: usize,

    /// Capacity of the lifecycle notification channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_model_name() -> String { "record".to_string() }
fn default_bulk_size() -> usize { 1000 }
fn default_bulk_delay_ms() -> u64 { 1000 }
fn default_retry_on_conflict() -> u32 { 3 }
fn default_delete_tries() -> u32 { 3 }
fn default_delete_backoff_ms() -> u64 { 500 }
fn default_backfill_close_poll_ms() -> u64 { 100 }
fn default_backfill_high_watermark_factor() -> usize { 5 }
fn default_requery_limit() -> usize { 50 }
fn default_event_capacity() -> usize { 1024 }

#[derive(Deserialize)]
#[serde(untagged)]
enum BulkSetting {
    Toggle(bool),
    Config(BulkConfig),
}

fn deserialize_bulk<'de, D>(deserializer: D) -> Result<Option<BulkConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<BulkSetting>::deserialize(deserializer)? {
        None | Some(BulkSetting::Toggle(false)) => None,
        Some(BulkSetting::Toggle(true)) => Some(BulkConfig::default()),
        Some(BulkSetting::Config(config)) => Some(config),
    })
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            index: None,
            type_name: None,
            hydrate: false,
            hydrate_options: Vec::new(),
            bulk: None,
            identifying_paths: Vec::new(),
            route_path: None,
            retry_on_conflict: default_retry_on_conflict(),
            delete_tries: default_delete_tries(),
            delete_backoff_ms: default_delete_backoff_ms(),
            backfill_close_poll_ms: default_backfill_close_poll_ms(),
            backfill_high_watermark_factor: default_backfill_high_watermark_factor(),
            requery_limit: default_requery_limit(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SyncConfig {
    /// Config for `model_name` with every other setting at its default.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn index_name(&self) -> String {
        match &self.index {
            Some(index) => index.clone(),
            None => format!("{}s", self.model_name.to_lowercase()),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> String {
        match &self.type_name {
            Some(type_name) => type_name.clone(),
            None => self.model_name.to_lowercase(),
        }
    }

    /// Identifying paths with `_id` appended, duplicates removed, order kept.
    #[must_use]
    pub fn identity_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::with_capacity(self.identifying_paths.len() + 1);
        for path in self.identifying_paths.iter().map(String::as_str).chain([ID_PATH]) {
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        }
        paths
    }

    /// Bulk thresholds for the operation buffer, configured or default.
    #[must_use]
    pub fn bulk_or_default(&self) -> BulkConfig {
        self.bulk.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn delete_backoff(&self) -> Duration {
        Duration::from_millis(self.delete_backoff_ms)
    }

    #[must_use]
    pub fn backfill_close_poll(&self) -> Duration {
        Duration::from_millis(self.backfill_close_poll_ms)
    }
}
