// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backfill: stream an existing collection into the index.
//!
//! The primary-store cursor is the only place backpressure can be applied,
//! so flow control is a pair of watermarks over `pending` (records read but
//! not yet acknowledged by the backend):
//!
//! ```text
//!   pending > 5 × batch  ──► pause cursor   (stop reading)
//!   pending ≤ batch      ──► resume cursor  (after completions drain it)
//! ```
//!
//! Every record goes through the [`OperationBuffer`], whatever the engine's
//! `bulk` setting. Completion is not the cursor ending: writes are still in
//! flight at that point. After the cursor ends the driver polls until
//! nothing is pending and the buffer is empty, then emits a single
//! [`BackfillEvent::Close`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::batching::operation::OperationFactory;
use crate::batching::operation_buffer::OperationBuffer;
use crate::coordinator::IndexOutcome;
use crate::error::SyncError;
use crate::metrics;
use crate::record::RecordFilter;
use crate::storage::traits::{PrimaryStore, RecordCursor, StoreQuery, WriteAck};

/// Default poll interval while waiting for in-flight work after the cursor ends.
pub const DEFAULT_CLOSE_POLL: Duration = Duration::from_millis(100);

/// Default high watermark as a multiple of the batch size.
pub const DEFAULT_HIGH_WATERMARK_FACTOR: usize = 5;

/// Flow-control change produced by a watermark transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowChange {
    None,
    Pause,
    Resume,
}

/// Watermark bookkeeping for one backfill.
#[derive(Debug, Clone)]
pub struct BackfillCursor {
    pending: usize,
    paused: bool,
    high: usize,
    low: usize,
}

impl BackfillCursor {
    /// Pause above `factor × batch_size`, resume at or below `batch_size`.
    #[must_use]
    pub fn new(batch_size: usize, factor: usize) -> Self {
        let low = batch_size.max(1);
        Self {
            pending: 0,
            paused: false,
            high: low.saturating_mul(factor.max(1)),
            low,
        }
    }

    /// A record was read and submitted.
    pub fn record_read(&mut self) -> FlowChange {
        self.pending += 1;
        if self.pending > self.high && !self.paused {
            self.paused = true;
            FlowChange::Pause
        } else {
            FlowChange::None
        }
    }

    /// A submitted record was acknowledged (or failed).
    pub fn record_done(&mut self) -> FlowChange {
        self.pending = self.pending.saturating_sub(1);
        if self.pending <= self.low && self.paused {
            self.paused = false;
            FlowChange::Resume
        } else {
            FlowChange::None
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn high_watermark(&self) -> usize {
        self.high
    }

    #[must_use]
    pub fn low_watermark(&self) -> usize {
        self.low
    }
}

/// Counts reported with [`BackfillEvent::Close`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub indexed: usize,
    pub failed: usize,
    /// Records the filter kept out of the index
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub enum BackfillEvent {
    /// One record's outcome
    Data { id: String, outcome: IndexOutcome },
    /// A record write or a cursor read failed; the backfill carries on
    Error { id: Option<String>, error: SyncError },
    Paused { pending: usize },
    Resumed { pending: usize },
    /// Terminal: the cursor ended and every write has drained
    Close(BackfillSummary),
}

/// Events of one backfill, ending with exactly one `Close`.
pub struct BackfillStream {
    rx: mpsc::UnboundedReceiver<BackfillEvent>,
}

impl BackfillStream {
    pub async fn next(&mut self) -> Option<BackfillEvent> {
        self.rx.recv().await
    }

    /// Drain the stream and return the closing summary.
    pub async fn wait(mut self) -> Result<BackfillSummary, SyncError> {
        while let Some(event) = self.rx.recv().await {
            if let BackfillEvent::Close(summary) = event {
                return Ok(summary);
            }
        }
        Err(SyncError::Dropped)
    }
}

impl Stream for BackfillStream {
    type Item = BackfillEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct Flow {
    cursor: Mutex<BackfillCursor>,
    summary: Mutex<BackfillSummary>,
    drained: Notify,
}

/// Drives backfills for one record type.
#[derive(Clone)]
pub struct BackfillDriver {
    store: Arc<dyn PrimaryStore>,
    buffer: OperationBuffer,
    factory: OperationFactory,
    filter: Option<RecordFilter>,
    close_poll: Duration,
    high_watermark_factor: usize,
}

impl BackfillDriver {
    pub fn new(store: Arc<dyn PrimaryStore>, buffer: OperationBuffer, factory: OperationFactory) -> Self {
        Self {
            store,
            buffer,
            factory,
            filter: None,
            close_poll: DEFAULT_CLOSE_POLL,
            high_watermark_factor: DEFAULT_HIGH_WATERMARK_FACTOR,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Option<RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_close_poll(mut self, close_poll: Duration) -> Self {
        self.close_poll = close_poll;
        self
    }

    #[must_use]
    pub fn with_high_watermark_factor(mut self, factor: usize) -> Self {
        self.high_watermark_factor = factor;
        self
    }

    /// Start a backfill of every record matching `query`.
    ///
    /// Failing to open the cursor is returned directly; everything after
    /// that is reported on the stream.
    pub async fn synchronize(&self, query: StoreQuery) -> Result<BackfillStream, SyncError> {
        let batch_size = self.buffer.config().size;
        let cursor = self.store.stream(&query, batch_size).await?;
        let (tx, rx) = mpsc::unbounded_channel();

        let flow = Arc::new(Flow {
            cursor: Mutex::new(BackfillCursor::new(batch_size, self.high_watermark_factor)),
            summary: Mutex::new(BackfillSummary::default()),
            drained: Notify::new(),
        });

        info!(batch_size, "Backfill started");
        tokio::spawn(self.clone().run(cursor, flow, tx));

        Ok(BackfillStream { rx })
    }

    async fn run(
        self,
        mut cursor: Box<dyn RecordCursor>,
        flow: Arc<Flow>,
        tx: mpsc::UnboundedSender<BackfillEvent>,
    ) {
        while let Some(next) = cursor.next().await {
            let record = match next {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Backfill cursor failed, no further records will be read");
                    let _ = tx.send(BackfillEvent::Error {
                        id: None,
                        error: e.into(),
                    });
                    break;
                }
            };

            if self.filter.as_ref().is_some_and(|excluded| excluded(&record)) {
                flow.summary.lock().skipped += 1;
                let _ = tx.send(BackfillEvent::Data {
                    id: record.id,
                    outcome: IndexOutcome::Skipped,
                });
                continue;
            }

            let change = flow.cursor.lock().record_read();
            let pending = self.buffer.submit(self.factory.upsert(&record));

            let completion_flow = Arc::clone(&flow);
            let completion_tx = tx.clone();
            let id = record.id;
            tokio::spawn(async move {
                let event = match pending.await.and_then(WriteAck::into_result) {
                    Ok(ack) => {
                        completion_flow.summary.lock().indexed += 1;
                        BackfillEvent::Data {
                            id,
                            outcome: IndexOutcome::Written(ack),
                        }
                    }
                    Err(error) => {
                        completion_flow.summary.lock().failed += 1;
                        BackfillEvent::Error { id: Some(id), error }
                    }
                };
                // Event first, so Close can never overtake a record's outcome
                let _ = completion_tx.send(event);

                let (change, pending) = {
                    let mut cursor = completion_flow.cursor.lock();
                    (cursor.record_done(), cursor.pending())
                };
                metrics::set_backfill_pending(pending);
                if change == FlowChange::Resume {
                    completion_flow.drained.notify_one();
                }
            });

            if change == FlowChange::Pause {
                cursor.pause();
                let pending = flow.cursor.lock().pending();
                debug!(pending, "Backfill paused");
                metrics::record_backfill_flow("paused");
                let _ = tx.send(BackfillEvent::Paused { pending });

                while flow.cursor.lock().is_paused() {
                    flow.drained.notified().await;
                }

                cursor.resume();
                let pending = flow.cursor.lock().pending();
                debug!(pending, "Backfill resumed");
                metrics::record_backfill_flow("resumed");
                let _ = tx.send(BackfillEvent::Resumed { pending });
            }
        }

        let mut poll = tokio::time::interval(self.close_poll);
        loop {
            poll.tick().await;
            if flow.cursor.lock().pending() == 0 && self.buffer.is_empty() {
                break;
            }
        }

        let summary = flow.summary.lock().clone();
        info!(indexed = summary.indexed, failed = summary.failed, skipped = summary.skipped, "Backfill complete");
        let _ = tx.send(BackfillEvent::Close(summary));
    }
}
