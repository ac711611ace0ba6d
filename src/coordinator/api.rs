//! Write and administration API.
//!
//! - `index()` / `unindex()` - single-record writes, batched or immediate
//! - `create_mapping()` / `create_explicit_mapping()` - ensure index + mapping
//! - `synchronize()` - backfill existing records
//! - `flush()` / `refresh()` / `truncate()`

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::backfill::BackfillStream;
use crate::batching::operation_buffer::BatchResult;
use crate::error::SyncError;
use crate::metrics;
use crate::record::Record;
use crate::storage::traits::{StoreQuery, UpdateRequest, WriteAck};

use super::{IndexOptions, IndexOutcome, SyncEngine, SyncEvent};

impl SyncEngine {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Record writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Write `record` to the index as an upsert.
    ///
    /// Goes through the operation buffer when `bulk` is configured, otherwise
    /// issues a single update with `{doc, upsert}`. A record the filter
    /// excludes is not written and yields [`IndexOutcome::Skipped`].
    pub async fn index(&self, record: &Record, options: &IndexOptions) -> Result<IndexOutcome, SyncError> {
        if self.is_excluded(record) {
            debug!(id = %record.id, "Record excluded by filter, not indexed");
            return Ok(IndexOutcome::Skipped);
        }

        let factory = self.factory_for(options);
        let ack = if self.is_bulk() {
            self.buffer.submit(factory.upsert(record)).await?
        } else {
            let mut request = UpdateRequest::upsert(&factory.index, &factory.type_name, &record.id, record.document());
            request.routing = factory.routing_for(record);
            request.retry_on_conflict = factory.retry_on_conflict;

            let result = self.backend.update(&request).await;
            metrics::record_operation("update", if result.is_ok() { "success" } else { "error" });
            result?
        };

        ack.into_result().map(IndexOutcome::Written)
    }

    /// Remove `record` from the index and notify subscribers with
    /// [`SyncEvent::Removed`].
    ///
    /// Batched deletes go through the buffer; immediate deletes retry a
    /// "not found" answer up to `delete_tries` times.
    pub async fn unindex(&self, record: &Record, options: &IndexOptions) -> Result<WriteAck, SyncError> {
        let factory = self.factory_for(options);
        let result = if self.is_bulk() {
            self.buffer
                .submit(factory.delete(record))
                .await
                .and_then(WriteAck::into_result)
        } else {
            self.deleter
                .delete(&factory.index, &factory.type_name, &record.id, self.config.delete_tries as usize)
                .await
        };

        self.emit(SyncEvent::Removed {
            id: record.id.clone(),
            result: result.clone(),
        });
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Mappings
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create the index if needed and apply the generated mapping.
    pub async fn create_mapping(&self, settings: Option<&Value>) -> Result<(), SyncError> {
        let mapping = self.mapping.generate_mapping()?;
        self.create_explicit_mapping(&mapping, settings).await
    }

    /// Create the index if needed and apply `mapping` as given.
    pub async fn create_explicit_mapping(&self, mapping: &Value, settings: Option<&Value>) -> Result<(), SyncError> {
        let index = self.index_name();
        let type_name = self.type_name();
        self.creation
            .ensure_mapping(self.backend.as_ref(), index, type_name, mapping, settings)
            .await
            .map_err(|e| {
                warn!(index, type_name, error = %e, "Failed to apply mapping");
                e
            })?;
        info!(index, type_name, "Mapping applied");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Backfill & maintenance
    // ═══════════════════════════════════════════════════════════════════════════

    /// Re-index every record matching `query` (all records for
    /// [`StoreQuery::all`]). Progress is reported on the returned stream.
    pub async fn synchronize(&self, query: StoreQuery) -> Result<BackfillStream, SyncError> {
        self.backfill_driver().synchronize(query).await
    }

    /// Flush the operation buffer now.
    pub async fn flush(&self) -> Result<BatchResult, SyncError> {
        self.buffer.flush().await
    }

    /// Make recent writes visible to search.
    pub async fn refresh(&self, options: &IndexOptions) -> Result<(), SyncError> {
        let factory = self.factory_for(options);
        self.backend.refresh(&factory.index).await?;
        debug!(index = %factory.index, "Index refreshed");
        Ok(())
    }

    /// Delete every document of the type. Returns the number deleted.
    pub async fn truncate(&self, options: &IndexOptions) -> Result<u64, SyncError> {
        let factory = self.factory_for(options);
        let body = json!({ "query": { "match_all": {} } });
        let deleted = self
            .backend
            .delete_by_query(&factory.index, &factory.type_name, &body)
            .await?;
        info!(index = %factory.index, type_name = %factory.type_name, deleted, "Index truncated");
        Ok(deleted)
    }
}
