// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operation buffering with size/time flush.
//!
//! The [`OperationBuffer`] collects index operations into a live batch and
//! sends them to the backend in one bulk call, whichever comes first:
//! the batch reaches `size` wire entries, or `delay` elapses after the first
//! unflushed submit.
//!
//! Each submitted operation gets its own completion ([`Pending`]), even
//! though an update expands to two wire entries. Bulk results are matched
//! back to completions by operation position, never by entry position.
//!
//! ```text
//! submit ──► live Batch ──(size | delay | manual)──► swap ──► bulk() ──► completions
//!               ▲                                        │
//!               └──── new submits land here while ───────┘
//!                     the swapped batch is in flight
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::BulkConfig;
use crate::error::SyncError;
use crate::metrics;
use crate::storage::traits::{SearchBackend, WriteAck};

use super::operation::Operation;

type Completion = oneshot::Sender<Result<WriteAck, SyncError>>;

/// Batch flush trigger reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Entry count threshold reached
    Count,
    /// Delay timer fired
    Time,
    /// Manual flush requested
    Manual,
}

/// Result of a batch flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Operations in the batch
    pub total: usize,
    /// Operations the backend acknowledged
    pub succeeded: usize,
    /// Operations the backend rejected
    pub failed: usize,
}

impl BatchResult {
    /// Check if all items succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Wire entries plus one completion per contributing operation.
#[derive(Debug)]
pub struct Batch {
    entries: Vec<Value>,
    completions: Vec<Completion>,
    created_at: Instant,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            completions: Vec::new(),
            created_at: Instant::now(),
        }
    }

    fn push(&mut self, op: &Operation, completion: Completion) {
        self.entries.extend(op.to_entries());
        self.completions.push(completion);
    }

    /// Number of operations (completions) queued
    pub fn len(&self) -> usize {
        self.completions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completions.is_empty()
    }

    /// Number of wire entries queued
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn take(&mut self) -> Batch {
        std::mem::take(self)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion handle for one submitted operation.
///
/// Resolves with the backend's per-operation acknowledgement, or with the
/// batch-wide error if the whole bulk call failed.
#[derive(Debug)]
pub struct Pending {
    rx: oneshot::Receiver<Result<WriteAck, SyncError>>,
}

impl Future for Pending {
    type Output = Result<WriteAck, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SyncError::Dropped)))
    }
}

struct BufferState {
    batch: Batch,
    timer_armed: bool,
    /// Bumped on every cancel so a sleeping timer task knows it is stale
    timer_generation: u64,
    flush_scheduled: bool,
}

impl BufferState {
    fn cancel_timer(&mut self) {
        if self.timer_armed {
            self.timer_armed = false;
            self.timer_generation += 1;
        }
    }
}

struct BufferInner {
    backend: Arc<dyn SearchBackend>,
    config: BulkConfig,
    state: Mutex<BufferState>,
    /// Held for the duration of a flush: one bulk call in flight at a time
    flush_lock: tokio::sync::Mutex<()>,
}

/// Batches operations into bulk calls. Cheap to clone; clones share the
/// same live batch.
#[derive(Clone)]
pub struct OperationBuffer {
    inner: Arc<BufferInner>,
}

impl OperationBuffer {
    pub fn new(backend: Arc<dyn SearchBackend>, config: BulkConfig) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                backend,
                config,
                state: Mutex::new(BufferState {
                    batch: Batch::new(),
                    timer_armed: false,
                    timer_generation: 0,
                    flush_scheduled: false,
                }),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BulkConfig {
        &self.inner.config
    }

    /// Queue an operation. Must be called from within a tokio runtime.
    ///
    /// Reaching the size threshold schedules a flush right away and cancels
    /// the delay timer; otherwise the delay timer is armed if it is not
    /// already.
    pub fn submit(&self, op: Operation) -> Pending {
        let (tx, rx) = oneshot::channel();
        metrics::record_operation(op.kind().as_str(), "queued");

        let mut state = self.inner.state.lock();
        state.batch.push(&op, tx);

        if state.batch.entry_count() >= self.inner.config.size {
            state.cancel_timer();
            if !state.flush_scheduled {
                state.flush_scheduled = true;
                drop(state);
                self.spawn_flush(FlushReason::Count);
            }
        } else if !state.timer_armed {
            state.timer_armed = true;
            state.timer_generation += 1;
            let generation = state.timer_generation;
            drop(state);
            self.spawn_timer(generation);
        }

        Pending { rx }
    }

    /// Flush whatever is queued now.
    pub async fn flush(&self) -> Result<BatchResult, SyncError> {
        self.flush_with_reason(FlushReason::Manual).await
    }

    /// Operations queued in the live batch (not counting an in-flight flush).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().batch.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().batch.is_empty()
    }

    /// Wire entries queued in the live batch.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.inner.state.lock().batch.entry_count()
    }

    fn spawn_flush(&self, reason: FlushReason) {
        let buffer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = buffer.run_flush(reason).await {
                debug!(error = %e, reason = ?reason, "Background flush failed");
            }
        });
    }

    fn spawn_timer(&self, generation: u64) {
        let buffer = self.clone();
        let delay = self.inner.config.delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let state = buffer.inner.state.lock();
                if !state.timer_armed || state.timer_generation != generation {
                    return;
                }
            }
            if let Err(e) = buffer.run_flush(FlushReason::Time).await {
                debug!(error = %e, "Timed flush failed");
            }
        });
    }

    /// Runs the flush on its own task: once a batch is swapped out, its
    /// callers get the backend's verdict even if this future is dropped.
    async fn flush_with_reason(&self, reason: FlushReason) -> Result<BatchResult, SyncError> {
        let buffer = self.clone();
        tokio::spawn(async move { buffer.run_flush(reason).await })
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, reason = ?reason, "Flush task did not complete");
                Err(SyncError::Dropped)
            })
    }

    async fn run_flush(&self, reason: FlushReason) -> Result<BatchResult, SyncError> {
        let _in_flight = self.inner.flush_lock.lock().await;

        // Swap inside the flush lock so batches reach the backend in submission order.
        let batch = {
            let mut state = self.inner.state.lock();
            state.cancel_timer();
            state.flush_scheduled = false;
            state.batch.take()
        };

        if batch.is_empty() {
            return Ok(BatchResult::default());
        }

        let total = batch.len();
        let entries = batch.entry_count();
        debug!(total, entries, age_ms = batch.age().as_millis() as u64, reason = ?reason, "Batch taken for flush");
        metrics::record_batch_size(total);

        let started = Instant::now();
        let outcome = self.inner.backend.bulk(&batch.entries).await;
        metrics::record_latency("bulk", started.elapsed());

        let completions = batch.completions;
        match outcome {
            Ok(response) if response.items.len() == completions.len() => {
                let mut result = BatchResult { total, succeeded: 0, failed: 0 };
                for (completion, item) in completions.into_iter().zip(response.items).rev() {
                    if item.is_success() {
                        result.succeeded += 1;
                    } else {
                        result.failed += 1;
                    }
                    // Receiver may have been dropped by a caller that stopped waiting.
                    let _ = completion.send(Ok(item));
                }
                metrics::record_flush(reason, "success");
                info!(total, succeeded = result.succeeded, failed = result.failed, reason = ?reason, "Batch flush complete");
                Ok(result)
            }
            Ok(response) => {
                let err = SyncError::BatchCountMismatch {
                    expected: total,
                    actual: response.items.len(),
                };
                warn!(expected = total, actual = response.items.len(), "Bulk result count mismatch, failing batch");
                metrics::record_flush(reason, "mismatch");
                fail_all(completions, &err);
                Err(err)
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(total, error = %err, "Bulk write failed, failing batch");
                metrics::record_flush(reason, "error");
                fail_all(completions, &err);
                Err(err)
            }
        }
    }
}

fn fail_all(completions: Vec<Completion>, err: &SyncError) {
    for completion in completions.into_iter().rev() {
        let _ = completion.send(Err(err.clone()));
    }
}
