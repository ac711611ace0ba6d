// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine coordinator.
//!
//! The [`SyncEngine`] ties the components together for one record type:
//! - [`OperationBuffer`] for batched writes
//! - [`IndexCreationCoordinator`] for one-shot index creation
//! - [`RetryingDeleter`] for immediate deletes
//! - hydration of search results from the primary store
//! - backfill of existing records
//!
//! # Data flow
//!
//! ```text
//! after_save / after_remove / after_query_update
//!       │
//!       ├─→ bulk configured? ──► OperationBuffer ──► backend.bulk
//!       │
//!       └─→ immediate ──► backend.update / RetryingDeleter
//!
//! search ──► backend.search ──► (hydrate from primary store) ──► caller
//! synchronize ──► store cursor ──► BackfillDriver ──► OperationBuffer
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use search_sync::{SyncConfig, SyncEngine, Record, IndexOptions};
//! use search_sync::storage::memory::InMemoryBackend;
//! use search_sync::storage::record_store::InMemoryRecordStore;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), search_sync::SyncError> {
//! let engine = SyncEngine::builder(
//!     SyncConfig::new("Book"),
//!     Arc::new(InMemoryBackend::new()),
//!     Arc::new(InMemoryRecordStore::new()),
//! )
//! .build();
//!
//! engine.create_mapping(None).await?;
//! engine.index(&Record::new("1", json!({"title": "Dune"})), &IndexOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod dispatch;
mod search_api;
mod types;

pub use types::{IndexOptions, IndexOutcome, SearchOutcome, SyncEvent};

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::backfill::BackfillDriver;
use crate::batching::operation::OperationFactory;
use crate::batching::operation_buffer::OperationBuffer;
use crate::config::SyncConfig;
use crate::mapping::{IndexCreationCoordinator, MappingGenerator, StaticMapping};
use crate::record::{Record, RecordFilter};
use crate::resilience::retry::RetryingDeleter;
use crate::storage::traits::{PrimaryStore, SearchBackend};

/// Keeps one index in step with one record type.
///
/// # Thread Safety
///
/// The engine is `Send + Sync`; share it behind an `Arc`. All operations
/// take `&self`.
pub struct SyncEngine {
    pub(super) config: SyncConfig,
    pub(super) backend: Arc<dyn SearchBackend>,
    pub(super) store: Arc<dyn PrimaryStore>,
    /// Always present: lifecycle writes use it when `bulk` is configured,
    /// backfills use it unconditionally
    pub(super) buffer: OperationBuffer,
    pub(super) factory: OperationFactory,
    pub(super) creation: IndexCreationCoordinator,
    pub(super) deleter: RetryingDeleter,
    pub(super) mapping: Arc<dyn MappingGenerator>,
    pub(super) filter: Option<RecordFilter>,
    pub(super) events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn builder(
        config: SyncConfig,
        backend: Arc<dyn SearchBackend>,
        store: Arc<dyn PrimaryStore>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            config,
            backend,
            store,
            mapping: None,
            filter: None,
            creation: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.factory.index
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.factory.type_name
    }

    /// The shared operation buffer.
    #[must_use]
    pub fn buffer(&self) -> &OperationBuffer {
        &self.buffer
    }

    /// Whether lifecycle writes go through the buffer.
    #[must_use]
    pub fn is_bulk(&self) -> bool {
        self.config.bulk.is_some()
    }

    /// Receive lifecycle notifications. Events sent while nobody is
    /// subscribed are dropped.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub(super) fn is_excluded(&self, record: &Record) -> bool {
        self.filter.as_ref().is_some_and(|excluded| excluded(record))
    }

    pub(super) fn emit(&self, event: SyncEvent) {
        if self.events.send(event).is_err() {
            debug!("No subscribers for sync event");
        }
    }

    pub(super) fn factory_for(&self, options: &IndexOptions) -> OperationFactory {
        self.factory
            .retarget(options.index.as_deref(), options.type_name.as_deref())
    }

    pub(super) fn backfill_driver(&self) -> BackfillDriver {
        BackfillDriver::new(Arc::clone(&self.store), self.buffer.clone(), self.factory.clone())
            .with_filter(self.filter.clone())
            .with_close_poll(self.config.backfill_close_poll())
            .with_high_watermark_factor(self.config.backfill_high_watermark_factor)
    }
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    config: SyncConfig,
    backend: Arc<dyn SearchBackend>,
    store: Arc<dyn PrimaryStore>,
    mapping: Option<Arc<dyn MappingGenerator>>,
    filter: Option<RecordFilter>,
    creation: Option<IndexCreationCoordinator>,
}

impl SyncEngineBuilder {
    /// Mapping source for `create_mapping` (default: empty properties).
    #[must_use]
    pub fn mapping(mut self, mapping: Arc<dyn MappingGenerator>) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Records for which `filter` returns `true` are never indexed.
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Use an isolated creation coordinator instead of the process-wide one.
    #[must_use]
    pub fn creation_coordinator(mut self, creation: IndexCreationCoordinator) -> Self {
        self.creation = Some(creation);
        self
    }

    pub fn build(self) -> SyncEngine {
        let config = self.config;
        let factory = OperationFactory {
            index: config.index_name(),
            type_name: config.type_name(),
            route_path: config.route_path.clone(),
            retry_on_conflict: config.retry_on_conflict,
        };
        let buffer = OperationBuffer::new(Arc::clone(&self.backend), config.bulk_or_default());
        let deleter = RetryingDeleter::new(Arc::clone(&self.backend), config.delete_backoff());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        debug!(
            index = %factory.index,
            type_name = %factory.type_name,
            bulk = config.bulk.is_some(),
            "Sync engine built"
        );

        SyncEngine {
            backend: self.backend,
            store: self.store,
            buffer,
            factory,
            creation: self.creation.unwrap_or_else(IndexCreationCoordinator::global),
            deleter,
            mapping: self.mapping.unwrap_or_else(|| Arc::new(StaticMapping::default())),
            filter: self.filter,
            events,
            config,
        }
    }
}
