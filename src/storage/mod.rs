//! Collaborator traits and their in-memory implementations.
//!
//! - [`traits`]: `SearchBackend`, `PrimaryStore`, `RecordCursor`
//! - [`memory`]: in-process search backend
//! - [`record_store`]: in-process primary store

pub mod memory;
pub mod record_store;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
