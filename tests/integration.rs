//! Integration Tests for Search Sync
//!
//! End-to-end scenarios against the in-memory search backend and record
//! store. No external services are needed.
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//!
//! # Only backfill scenarios
//! cargo test --test integration backfill
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: mapping, index, search, hydrate, truncate
//! - `backfill_*` - Re-sync of existing records
//! - `hooks_*` - Lifecycle hooks and notifications

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use search_sync::storage::memory::InMemoryBackend;
use search_sync::storage::record_store::InMemoryRecordStore;
use search_sync::{
    BackfillEvent, BulkConfig, IndexCreationCoordinator, IndexOptions, IndexOutcome, QueryModifier, Record,
    SearchOptions, StaticMapping, StoreQuery, SyncConfig, SyncEngine, SyncEvent,
};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    engine: SyncEngine,
    backend: Arc<InMemoryBackend>,
    store: Arc<InMemoryRecordStore>,
}

fn harness(config: SyncConfig) -> Harness {
    let backend = Arc::new(InMemoryBackend::new());
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = SyncEngine::builder(config, backend.clone(), store.clone())
        .mapping(Arc::new(StaticMapping(json!({"properties": {"title": {"type": "text"}}}))))
        .creation_coordinator(IndexCreationCoordinator::new())
        .build();
    Harness { engine, backend, store }
}

fn book(id: &str, title: &str) -> Record {
    Record::new(id, json!({"title": title, "shelf": "fiction"}))
}

fn bulk(size: usize, delay_ms: u64) -> SyncConfig {
    let mut config = SyncConfig::new("Book");
    config.bulk = Some(BulkConfig { size, delay_ms });
    config
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn happy_mapping_index_search_roundtrip() {
    let h = harness(SyncConfig::new("Book"));

    h.engine.create_mapping(Some(&json!({"number_of_shards": 1}))).await.unwrap();
    assert_eq!(h.backend.mapping("books", "book"), Some(json!({"properties": {"title": {"type": "text"}}})));
    assert_eq!(h.backend.settings("books"), Some(json!({"number_of_shards": 1})));

    for (id, title) in [("1", "Dune"), ("2", "Dune Messiah"), ("3", "Emma")] {
        let outcome = h.engine.index(&book(id, title), &IndexOptions::default()).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Written(_)));
    }
    h.engine.refresh(&IndexOptions::default()).await.unwrap();

    let outcome = h
        .engine
        .search(json!({"query": {"match": {"title": "dune"}}}), SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.response().ids(), vec!["1".to_string(), "2".to_string()]);
    assert_eq!(h.engine.count(Some(json!({"match": {"title": "emma"}}))).await.unwrap(), 1);
    assert_eq!(h.engine.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn happy_mapping_applied_twice_creates_once() {
    let h = harness(SyncConfig::new("Book"));

    let (a, b) = tokio::join!(h.engine.create_mapping(None), h.engine.create_mapping(None));
    a.unwrap();
    b.unwrap();

    assert!(h.backend.mapping("books", "book").is_some());
}

#[tokio::test]
async fn happy_hydrated_search_reads_primary_store() {
    let mut config = SyncConfig::new("Book");
    config.hydrate = true;
    config.hydrate_options = vec![QueryModifier::Select(vec!["title".into()])];
    let h = harness(config);

    h.engine.index(&book("1", "Dune"), &IndexOptions::default()).await.unwrap();
    h.engine.index(&book("2", "Dune Messiah"), &IndexOptions::default()).await.unwrap();
    // Primary store has newer content for 1, and 2 has been deleted
    h.store.insert(Record::new("1", json!({"title": "Dune (revised)", "shelf": "classics"})));

    let outcome = h
        .engine
        .search(json!({"query": {"match": {"title": "dune"}}}), SearchOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_hydrated());
    let search_sync::SearchOutcome::Hydrated(hydrated) = outcome else {
        unreachable!();
    };
    assert_eq!(
        hydrated.sources,
        vec![
            json!({"title": "Dune (revised)"}),
            json!({"title": "Dune Messiah", "shelf": "fiction"}),
        ]
    );
}

#[tokio::test]
async fn happy_routing_and_overrides() {
    let mut config = SyncConfig::new("Book");
    config.route_path = Some("shelf".into());
    let h = harness(config);

    h.engine
        .index(&book("1", "Dune"), &IndexOptions::index("archive").with_type("old_book"))
        .await
        .unwrap();

    assert!(h.backend.document("archive", "old_book", "1").is_some());
    assert!(h.backend.document("books", "book", "1").is_none());
}

#[tokio::test]
async fn happy_unindex_and_truncate() {
    let h = harness(SyncConfig::new("Book"));
    for id in ["1", "2", "3"] {
        h.engine.index(&book(id, "x"), &IndexOptions::default()).await.unwrap();
    }

    let ack = h.engine.unindex(&book("2", "x"), &IndexOptions::default()).await.unwrap();
    assert_eq!(ack.id, "2");
    assert_eq!(h.backend.doc_count("books"), 2);

    let deleted = h.engine.truncate(&IndexOptions::default()).await.unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(h.backend.doc_count("books"), 0);
}

#[tokio::test(start_paused = true)]
async fn happy_bulk_writes_land_after_delay() {
    let h = harness(bulk(1000, 200));
    let engine = Arc::new(h.engine);

    let writers: Vec<_> = (0..10)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.index(&book(&i.to_string(), "t"), &IndexOptions::default()).await })
        })
        .collect();
    for writer in writers {
        assert!(writer.await.unwrap().is_ok());
    }

    assert_eq!(h.backend.doc_count("books"), 10);
    assert!(engine.buffer().is_empty());
}

#[tokio::test(start_paused = true)]
async fn happy_bulk_unindex_of_missing_doc_reports_rejection() {
    let h = harness(bulk(1000, 10));

    let err = h.engine.unindex(&book("ghost", "x"), &IndexOptions::default()).await.unwrap_err();

    assert!(matches!(err, search_sync::SyncError::Rejected { status: 404, .. }));
}

#[tokio::test(start_paused = true)]
async fn happy_immediate_unindex_of_missing_doc_gives_up() {
    let mut config = SyncConfig::new("Book");
    config.delete_tries = 2;
    let h = harness(config);

    let started = tokio::time::Instant::now();
    let err = h.engine.unindex(&book("ghost", "x"), &IndexOptions::default()).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(started.elapsed() >= Duration::from_millis(1000));
}

// =============================================================================
// Backfill
// =============================================================================

#[tokio::test(start_paused = true)]
async fn backfill_indexes_whole_collection() {
    let h = harness(bulk(100, 50));
    for i in 0..1_000 {
        h.store.insert(Record::new(format!("b{i:04}"), json!({"n": i})));
    }

    let mut stream = h.engine.synchronize(StoreQuery::all()).await.unwrap();
    let mut paused = false;
    let mut data = 0;
    let summary = loop {
        match stream.next().await.unwrap() {
            BackfillEvent::Data { .. } => data += 1,
            BackfillEvent::Paused { pending } => {
                assert!(pending > 500);
                paused = true;
            }
            BackfillEvent::Resumed { pending } => assert!(pending <= 100),
            BackfillEvent::Error { error, .. } => panic!("backfill error: {error}"),
            BackfillEvent::Close(summary) => break summary,
        }
    };

    assert!(paused);
    assert_eq!(data, 1_000);
    assert_eq!(summary.indexed, 1_000);
    assert_eq!(h.backend.doc_count("books"), 1_000);
}

#[tokio::test(start_paused = true)]
async fn backfill_query_selects_subset() {
    let h = harness(SyncConfig::new("Book"));
    h.store.insert(Record::new("a", json!({"shelf": "fiction"})));
    h.store.insert(Record::new("b", json!({"shelf": "poetry"})));
    h.store.insert(Record::new("c", json!({"shelf": "fiction"})));

    let summary = h
        .engine
        .synchronize(StoreQuery::new(json!({"shelf": "fiction"})))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.indexed, 2);
    assert!(h.backend.document("books", "book", "b").is_none());
}

// =============================================================================
// Hooks
// =============================================================================

#[tokio::test]
async fn hooks_save_and_remove_notify_subscribers() {
    let h = harness(SyncConfig::new("Book"));
    let mut events = h.engine.subscribe();
    let record = book("1", "Dune");

    h.store.insert(record.clone());
    h.engine.after_save(&record).await;
    h.store.remove("1");
    h.engine.after_remove(&record).await;

    let indexed = events.recv().await.unwrap();
    let removed = events.recv().await.unwrap();
    assert!(matches!(indexed, SyncEvent::Indexed { ref id, result: Ok(_) } if id == "1"));
    assert!(matches!(removed, SyncEvent::Removed { ref id, result: Ok(_) } if id == "1"));
    assert_eq!(h.backend.doc_count("books"), 0);
}

#[tokio::test]
async fn hooks_query_update_reindexes_by_identifying_path() {
    let mut config = SyncConfig::new("Book");
    config.identifying_paths = vec!["isbn".into()];
    let h = harness(config);
    h.store.insert(Record::new("1", json!({"isbn": "111", "title": "Old"})));
    h.store.insert(Record::new("2", json!({"isbn": "222", "title": "Other"})));
    h.engine.index(&h.store.get("1").unwrap(), &IndexOptions::default()).await.unwrap();

    // The primary store applied an update-by-query
    h.store.insert(Record::new("1", json!({"isbn": "111", "title": "New"})));
    let reindexed = h
        .engine
        .after_query_update(&json!({"isbn": "111", "title": "Old"}))
        .await;

    // `title: Old` no longer matches, but the identifying path still does
    assert_eq!(reindexed, 1);
    assert_eq!(h.backend.document("books", "book", "1").unwrap()["title"], "New");
    assert!(h.backend.document("books", "book", "2").is_none());
}

#[tokio::test]
async fn hooks_filter_keeps_records_out() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = SyncEngine::builder(SyncConfig::new("Book"), backend.clone(), store)
        .creation_coordinator(IndexCreationCoordinator::new())
        .filter(|r: &Record| r.get_path("draft") == Some(json!(true)))
        .build();

    engine.after_save(&Record::new("d", json!({"draft": true}))).await;
    engine.after_save(&Record::new("p", json!({"draft": false}))).await;

    assert!(backend.document("books", "book", "d").is_none());
    assert!(backend.document("books", "book", "p").is_some());
}
