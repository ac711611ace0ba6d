// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for search-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `search_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: index, update, delete, bulk, search, count, ...
//! - `status`: success, error, queued, mismatch
//! - `reason`: count, time, manual (flush trigger)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::batching::operation_buffer::FlushReason;

/// Record a write or read against the backend
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "search_sync_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "search_sync_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record operations per flushed batch
pub fn record_batch_size(count: usize) {
    histogram!("search_sync_batch_size").record(count as f64);
}

/// Record a buffer flush and what triggered it
pub fn record_flush(reason: FlushReason, status: &str) {
    let reason = match reason {
        FlushReason::Count => "count",
        FlushReason::Time => "time",
        FlushReason::Manual => "manual",
    };
    counter!(
        "search_sync_flushes_total",
        "reason" => reason,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an index created by this process
pub fn record_index_created() {
    counter!("search_sync_indices_created_total").increment(1);
}

/// Record a retry of a transient failure
pub fn record_retry(operation: &str) {
    counter!(
        "search_sync_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record hits hydrated from the primary store (and how many were stale)
pub fn record_hydration(hits: usize, fetched: usize) {
    histogram!("search_sync_hydrated_hits").record(hits as f64);
    counter!("search_sync_hydration_misses_total").increment(hits.saturating_sub(fetched) as u64);
}

/// Set records read by a backfill but not yet confirmed written
pub fn set_backfill_pending(pending: usize) {
    gauge!("search_sync_backfill_pending").set(pending as f64);
}

/// Record a backfill flow-control transition (`paused` / `resumed`)
pub fn record_backfill_flow(transition: &'static str) {
    counter!(
        "search_sync_backfill_flow_total",
        "transition" => transition
    )
    .increment(1);
}

/// Record a lifecycle hook invocation
pub fn record_hook(hook: &'static str, status: &'static str) {
    counter!(
        "search_sync_hooks_total",
        "hook" => hook,
        "status" => status
    )
    .increment(1);
}

/// RAII timer that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($op:expr) => {
        $crate::metrics::LatencyTimer::new($op)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_total(snapshot: Vec<(metrics_util::CompositeKey, Option<metrics::Unit>, Option<metrics::SharedString>, DebugValue)>, name: &str) -> u64 {
        snapshot
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => v,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_flush_counter_is_labelled_by_reason() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_flush(FlushReason::Count, "success");
            record_flush(FlushReason::Time, "success");
            record_flush(FlushReason::Manual, "error");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let reasons: Vec<String> = snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "search_sync_flushes_total")
            .flat_map(|(key, _, _, _)| key.key().labels().filter(|l| l.key() == "reason").map(|l| l.value().to_string()).collect::<Vec<_>>())
            .collect();
        assert_eq!(reasons.len(), 3);
        assert!(reasons.contains(&"count".to_string()));
        assert!(reasons.contains(&"manual".to_string()));
        assert_eq!(counter_total(snapshot, "search_sync_flushes_total"), 3);
    }

    #[test]
    fn test_hydration_counts_misses() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_hydration(10, 7);
            record_hydration(3, 3);
        });

        assert_eq!(counter_total(snapshotter.snapshot().into_vec(), "search_sync_hydration_misses_total"), 3);
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_operation("index", "success");
        record_latency("bulk", Duration::from_millis(5));
        record_batch_size(100);
        record_retry("delete");
        set_backfill_pending(42);
        record_backfill_flow("paused");
        record_hook("after_save", "success");
        record_index_created();
    }

    #[test]
    fn test_latency_timer() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let _timer = time_operation!("search");
        });

        let recorded = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .any(|(key, _, _, value)| {
                key.key().name() == "search_sync_operation_seconds" && matches!(value, DebugValue::Histogram(ref v) if v.len() == 1)
            });
        assert!(recorded);
    }
}
