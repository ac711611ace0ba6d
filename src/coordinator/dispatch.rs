//! Lifecycle hooks: the bridge from primary-store events to index writes.
//!
//! Hooks never return errors. Failures are logged, counted, and carried in
//! the [`SyncEvent`] sent to subscribers.

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::metrics;
use crate::record::{lookup_path, Record};
use crate::storage::traits::StoreQuery;

use super::{IndexOptions, IndexOutcome, SyncEngine, SyncEvent};

impl SyncEngine {
    /// A record was saved: index it and notify subscribers, unless the
    /// filter excludes it.
    pub async fn after_save(&self, record: &Record) {
        match self.index(record, &IndexOptions::default()).await {
            Ok(IndexOutcome::Skipped) => {
                metrics::record_hook("after_save", "skipped");
            }
            Ok(IndexOutcome::Written(ack)) => {
                metrics::record_hook("after_save", "success");
                self.emit(SyncEvent::Indexed {
                    id: record.id.clone(),
                    result: Ok(ack),
                });
            }
            Err(e) => {
                warn!(id = %record.id, error = %e, "Failed to index saved record");
                metrics::record_hook("after_save", "error");
                self.emit(SyncEvent::Indexed {
                    id: record.id.clone(),
                    result: Err(e),
                });
            }
        }
    }

    /// A record was removed: delete it from the index. `unindex` sends the
    /// [`SyncEvent::Removed`] notification.
    pub async fn after_remove(&self, record: &Record) {
        match self.unindex(record, &IndexOptions::default()).await {
            Ok(_) => metrics::record_hook("after_remove", "success"),
            Err(e) => {
                warn!(id = %record.id, error = %e, "Failed to remove record from index");
                metrics::record_hook("after_remove", "error");
            }
        }
    }

    /// A query-level update touched an unknown set of records. Rebuild an
    /// identifying filter from `conditions`, re-fetch up to
    /// `requery_limit` matches and re-index them.
    ///
    /// Best effort: updates whose conditions do not identify the records
    /// reach the index on the next backfill. Returns the number of records
    /// re-indexed.
    pub async fn after_query_update(&self, conditions: &Value) -> usize {
        if conditions.as_object().map_or(true, Map::is_empty) {
            return 0;
        }

        let filter = identity_conditions(conditions, &self.config.identity_paths());
        let query = StoreQuery::new(filter).limit(self.config.requery_limit);
        let records = match self.store.find(&query).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Re-fetch after query update failed");
                metrics::record_hook("after_query_update", "error");
                return 0;
            }
        };

        let options = IndexOptions::default();
        let results = join_all(records.iter().map(|record| self.index(record, &options))).await;

        let mut reindexed = 0;
        for (record, result) in records.iter().zip(results) {
            match result {
                Ok(IndexOutcome::Written(_)) => reindexed += 1,
                Ok(IndexOutcome::Skipped) => {}
                Err(e) => warn!(id = %record.id, error = %e, "Failed to re-index after query update"),
            }
        }
        debug!(matched = records.len(), reindexed, "Re-indexed after query update");
        metrics::record_hook("after_query_update", "success");
        reindexed
    }
}

/// Narrow `conditions` to the identifying paths.
///
/// Each path is looked up in the conditions, then in the first `$or`
/// alternative. Empty, null, false and zero values do not count. With no
/// path resolved the conditions are used as they are.
pub(crate) fn identity_conditions(conditions: &Value, paths: &[String]) -> Value {
    let first_alternative = conditions
        .get("$or")
        .and_then(|alternatives| alternatives.get(0));

    let mut resolved = Map::new();
    for path in paths {
        let value = conditions
            .get(path.as_str())
            .or_else(|| lookup_path(conditions, path))
            .filter(|v| is_truthy(v))
            .or_else(|| {
                first_alternative
                    .and_then(|alt| alt.get(path.as_str()))
                    .filter(|v| is_truthy(v))
            });
        if let Some(value) = value {
            resolved.insert(path.clone(), value.clone());
        }
    }

    if resolved.is_empty() {
        conditions.clone()
    } else {
        Value::Object(resolved)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::engine;
    use super::*;
    use crate::config::SyncConfig;
    use crate::mapping::IndexCreationCoordinator;
    use crate::storage::mock::{BulkMode, MockBackend};
    use crate::storage::record_store::InMemoryRecordStore;
    use crate::storage::traits::BackendError;
    use serde_json::json;
    use std::sync::Arc;

    fn paths(extra: &[&str]) -> Vec<String> {
        let mut config = SyncConfig::new("Book");
        config.identifying_paths = extra.iter().map(|s| s.to_string()).collect();
        config.identity_paths()
    }

    #[test]
    fn test_identity_from_direct_condition() {
        let conditions = json!({"slug": "dune", "title": "Dune"});
        assert_eq!(identity_conditions(&conditions, &paths(&["slug"])), json!({"slug": "dune"}));
    }

    #[test]
    fn test_identity_from_first_or_alternative() {
        let conditions = json!({"$or": [{"_id": "a"}, {"_id": "b"}], "published": true});
        assert_eq!(identity_conditions(&conditions, &paths(&[])), json!({"_id": "a"}));
    }

    #[test]
    fn test_identity_from_nested_path() {
        let conditions = json!({"author": {"name": "Herbert"}});
        assert_eq!(
            identity_conditions(&conditions, &paths(&["author.name"])),
            json!({"author.name": "Herbert"})
        );
    }

    #[test]
    fn test_falsy_values_fall_back_to_raw_conditions() {
        let conditions = json!({"slug": "", "year": 1965});
        assert_eq!(identity_conditions(&conditions, &paths(&["slug"])), conditions);
    }

    #[tokio::test]
    async fn test_after_save_emits_indexed() {
        let (engine, _, _) = engine(None);
        let mut events = engine.subscribe();

        engine.after_save(&Record::new("a", json!({"title": "Dune"}))).await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.id(), "a");
        assert!(matches!(event, SyncEvent::Indexed { result: Ok(_), .. }));
    }

    #[tokio::test]
    async fn test_filtered_save_is_silent() {
        let backend = Arc::new(MockBackend::new());
        let store = Arc::new(InMemoryRecordStore::new());
        let engine = SyncEngine::builder(SyncConfig::new("Book"), backend.clone(), store)
            .creation_coordinator(IndexCreationCoordinator::new())
            .filter(|r: &Record| r.get_path("draft") == Some(json!(true)))
            .build();
        let mut events = engine.subscribe();

        engine.after_save(&Record::new("a", json!({"draft": true}))).await;

        assert!(events.try_recv().is_err());
        assert!(backend.updates.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_remove_reports_failure_without_panicking() {
        let (engine, backend, _) = engine(None);
        backend
            .delete_script
            .lock()
            .push_back(Err(BackendError::Transport("connection refused".into())));
        let mut events = engine.subscribe();

        engine.after_remove(&Record::new("a", json!({}))).await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, SyncEvent::Removed { result: Err(_), .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_query_update_respects_requery_limit() {
        let (engine, backend, store) = engine(None);
        for i in 0..60 {
            store.insert(Record::new(format!("r{i:02}"), json!({"shelf": "s1"})));
        }

        let reindexed = engine.after_query_update(&json!({"shelf": "s1"})).await;

        assert_eq!(reindexed, 50);
        assert_eq!(backend.updates.lock().len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_query_update_batches_when_bulk() {
        let (engine, backend, store) = engine(Some(crate::config::BulkConfig { size: 1000, delay_ms: 100 }));
        store.insert(Record::new("a", json!({"slug": "x"})));
        store.insert(Record::new("b", json!({"slug": "y"})));

        let reindexed = engine.after_query_update(&json!({"$or": [{"_id": "b"}]})).await;

        assert_eq!(reindexed, 1);
        assert_eq!(backend.bulk_calls.lock().clone(), vec![vec!["b".to_string()]]);
    }

    #[tokio::test]
    async fn test_empty_conditions_do_nothing() {
        let (engine, _, store) = engine(None);
        assert_eq!(engine.after_query_update(&json!({})).await, 0);
        assert_eq!(store.find_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_bulk_is_reported_per_record() {
        let (engine, backend, _) = engine(Some(crate::config::BulkConfig { size: 1000, delay_ms: 10 }));
        *backend.bulk_mode.lock() = BulkMode::Fail;
        let mut events = engine.subscribe();

        engine.after_save(&Record::new("a", json!({}))).await;

        assert!(!events.recv().await.unwrap().is_ok());
    }
}
