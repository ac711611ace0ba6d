//! # Search Sync
//!
//! Keeps a search index eventually consistent with a primary record store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Lifecycle hooks                         │
//! │  • after_save / after_remove / after_query_update           │
//! │  • SyncEvent notifications to subscribers                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               (immediate write, or batched when bulk is set)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     OperationBuffer                         │
//! │  • Flush by entry count or delay                            │
//! │  • Per-operation results matched back by position           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Search index backend                      │
//! │  • Index created once per name (IndexCreationCoordinator)   │
//! │  • Deletes retried while "not found" (RetryingDeleter)      │
//! └─────────────────────────────────────────────────────────────┘
//!
//!  search ──► backend ──► hydrate from primary store ──► caller
//!  synchronize ──► store cursor (paused/resumed) ──► OperationBuffer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use search_sync::{IndexOptions, Record, SearchOptions, SyncConfig, SyncEngine};
//! use search_sync::storage::memory::InMemoryBackend;
//! use search_sync::storage::record_store::InMemoryRecordStore;
//! use search_sync::storage::traits::StoreQuery;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), search_sync::SyncError> {
//!     let store = Arc::new(InMemoryRecordStore::new());
//!     store.insert(Record::new("1", json!({"title": "Dune"})));
//!
//!     let engine = SyncEngine::builder(SyncConfig::new("Book"), Arc::new(InMemoryBackend::new()), store)
//!         .build();
//!
//!     engine.create_mapping(None).await?;
//!     let summary = engine.synchronize(StoreQuery::all()).await?.wait().await?;
//!     println!("indexed {}", summary.indexed);
//!
//!     engine.refresh(&IndexOptions::default()).await?;
//!     let hits = engine
//!         .search(json!({"query": {"match": {"title": "dune"}}}), SearchOptions::hydrated())
//!         .await?;
//!     println!("{:?}", hits.response().ids());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncEngine`] facade and lifecycle hooks
//! - [`batching`]: Operations and the [`OperationBuffer`]
//! - [`mapping`]: Mapping generation and one-shot index creation
//! - [`resilience`]: Retry with backoff, [`RetryingDeleter`]
//! - [`search`]: Search request/response shapes and hydration
//! - [`backfill`]: Flow-controlled re-sync of existing records
//! - [`storage`]: Collaborator traits and in-memory implementations

pub mod backfill;
pub mod batching;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod record;
pub mod resilience;
pub mod search;
pub mod storage;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use backfill::{BackfillEvent, BackfillStream, BackfillSummary};
pub use batching::operation::{OpKind, Operation};
pub use batching::operation_buffer::{BatchResult, FlushReason, OperationBuffer, Pending};
pub use config::{BulkConfig, SyncConfig};
pub use coordinator::{IndexOptions, IndexOutcome, SearchOutcome, SyncEngine, SyncEngineBuilder, SyncEvent};
pub use error::SyncError;
pub use mapping::{IndexCreationCoordinator, MappingGenerator, StaticMapping};
pub use metrics::LatencyTimer;
pub use record::{Record, RecordFilter};
pub use resilience::retry::{RetryConfig, RetryingDeleter};
pub use search::{HydratedResponse, SearchOptions, SearchResponse};
pub use storage::traits::{BackendError, PrimaryStore, QueryModifier, SearchBackend, StoreQuery, WriteAck};
