// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic search-sync usage example.
//!
//! Demonstrates, against the in-memory backend and record store:
//! 1. Creating the index and mapping
//! 2. Backfilling existing records with `synchronize`
//! 3. Lifecycle hooks keeping the index current
//! 4. Raw and hydrated search
//! 5. Displaying the captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

use search_sync::storage::memory::InMemoryBackend;
use search_sync::storage::record_store::InMemoryRecordStore;
use search_sync::{
    BackfillEvent, BulkConfig, IndexOptions, Record, SearchOptions, SearchOutcome, StaticMapping, StoreQuery,
    SyncConfig, SyncEngine, SyncEvent,
};

const TITLES: [&str; 6] = [
    "Dune",
    "Dune Messiah",
    "Children of Dune",
    "Emma",
    "Persuasion",
    "The Left Hand of Darkness",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt().with_target(false).compact().init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           search-sync: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire the engine to its collaborators
    // ─────────────────────────────────────────────────────────────────────────
    let backend = Arc::new(InMemoryBackend::new());
    let store = Arc::new(InMemoryRecordStore::new());
    for (i, title) in TITLES.iter().enumerate() {
        store.insert(Record::new(format!("book-{i}"), json!({"title": title, "year": 1960 + i})));
    }

    let mut config = SyncConfig::new("Book");
    config.bulk = Some(BulkConfig { size: 4, delay_ms: 50 });
    let engine = SyncEngine::builder(config, backend.clone(), store.clone())
        .mapping(Arc::new(StaticMapping(json!({
            "properties": {"title": {"type": "text"}, "year": {"type": "integer"}}
        }))))
        .build();

    println!("📐 Creating index '{}' and mapping...", engine.index_name());
    engine.create_mapping(Some(&json!({"number_of_shards": 1}))).await?;
    println!("   └─ mapping: {}", backend.mapping("books", "book").unwrap_or_default());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Backfill existing records
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔄 Synchronizing {} existing records...", store.len());
    let mut stream = engine.synchronize(StoreQuery::all()).await?;
    while let Some(event) = stream.next().await {
        match event {
            BackfillEvent::Data { id, .. } => println!("   ├─ indexed {id}"),
            BackfillEvent::Error { id, error } => println!("   ├─ ❌ {}: {error}", id.unwrap_or_default()),
            BackfillEvent::Paused { pending } => println!("   ├─ ⏸  paused ({pending} pending)"),
            BackfillEvent::Resumed { pending } => println!("   ├─ ▶  resumed ({pending} pending)"),
            BackfillEvent::Close(summary) => {
                println!(
                    "   └─ done: {} indexed, {} failed, {} skipped",
                    summary.indexed, summary.failed, summary.skipped
                );
                break;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Lifecycle hooks
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🪝 Saving and removing records through hooks...");
    let mut events = engine.subscribe();

    let updated = Record::new("book-0", json!({"title": "Dune (40th anniversary)", "year": 2005}));
    store.insert(updated.clone());
    engine.after_save(&updated).await;

    if let Some(removed) = store.remove("book-3") {
        engine.after_remove(&removed).await;
    }

    for _ in 0..2 {
        match events.recv().await? {
            SyncEvent::Indexed { id, result } => println!("   ├─ es-indexed {id}: ok={}", result.is_ok()),
            SyncEvent::Removed { id, result } => println!("   ├─ es-removed {id}: ok={}", result.is_ok()),
        }
    }
    println!("   └─ index holds {} documents", backend.doc_count("books"));

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Search
    // ─────────────────────────────────────────────────────────────────────────
    engine.refresh(&IndexOptions::default()).await?;
    let query = json!({"query": {"match": {"title": "dune"}}});

    println!("\n🔍 Searching for 'dune'...");
    let raw = engine.search(query.clone(), SearchOptions::default()).await?;
    println!("   ├─ raw hits: {:?}", raw.response().ids());

    // Change the store behind the index's back; hydration reads the store
    store.insert(Record::new("book-1", json!({"title": "Dune Messiah (revised)", "year": 1969})));
    if let SearchOutcome::Hydrated(hydrated) = engine.search(query, SearchOptions::hydrated()).await? {
        for source in &hydrated.sources {
            println!("   ├─ hydrated: {source}");
        }
    }
    println!("   └─ total matching: {}", engine.count(Some(json!({"match": {"title": "dune"}}))).await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Print every captured metric, grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<(u8, String)> = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let name = if labels.is_empty() {
            key.name().to_string()
        } else {
            format!("{}{{{}}}", key.name(), labels.join(","))
        };

        match value {
            DebugValue::Counter(v) => lines.push((0, format!("counter   {name} = {v}"))),
            DebugValue::Gauge(v) => lines.push((1, format!("gauge     {name} = {:.2}", v.into_inner()))),
            DebugValue::Histogram(samples) => {
                let values: Vec<f64> = samples.iter().map(|v| v.into_inner()).collect();
                let sum: f64 = values.iter().sum();
                let max = values.iter().copied().fold(0.0, f64::max);
                lines.push((
                    2,
                    format!("histogram {name} count={} sum={sum:.4} max={max:.4}", values.len()),
                ));
            }
        }
    }

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
        return;
    }
    lines.sort();
    let last = lines.len() - 1;
    for (i, (_, line)) in lines.iter().enumerate() {
        println!("   {} {line}", if i == last { "└─" } else { "├─" });
    }
}
