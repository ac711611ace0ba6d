// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed-interval retry for transient backend failures.
//!
//! The one transient failure this engine retries is a delete that answers
//! "not found": the index write that created the document may not have
//! propagated yet. Everything else surfaces on the first attempt.
//!
//! # Example
//!
//! ```
//! use search_sync::RetryConfig;
//! use std::time::Duration;
//!
//! let delete = RetryConfig::delete(3);
//! assert_eq!(delete.max_retries, Some(3));
//! assert_eq!(delete.delay, Duration::from_millis(500));
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::metrics;
use crate::storage::traits::{SearchBackend, WriteAck};

/// Retry policy: a constant `delay` between attempts.
///
/// `max_retries` counts retries after the first attempt; `None` retries
/// forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub delay: Duration,
    pub max_retries: Option<usize>,
}

impl RetryConfig {
    /// Fixed 500ms interval, `tries` retries.
    #[must_use]
    pub fn delete(tries: usize) -> Self {
        Self::fixed(Duration::from_millis(500), tries)
    }

    #[must_use]
    pub fn fixed(delay: Duration, tries: usize) -> Self {
        Self {
            delay,
            max_retries: Some(tries),
        }
    }
}

/// Run `operation`, retrying while `is_transient` accepts the error and the
/// retry budget lasts. Non-transient errors return immediately.
pub async fn retry_when<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retries = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if retries > 0 {
                    info!(operation = operation_name, retries, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                if !is_transient(&err) {
                    return Err(err);
                }
                if config.max_retries.is_some_and(|max| retries >= max) {
                    warn!(operation = operation_name, retries, error = %err, "Retries exhausted");
                    return Err(err);
                }

                retries += 1;
                debug!(operation = operation_name, retry = retries, error = %err, delay = ?config.delay, "Transient failure, retrying");
                metrics::record_retry(operation_name);

                sleep(config.delay).await;
            }
        }
    }
}

/// Deletes single documents, retrying "not found" on a fixed interval.
#[derive(Clone)]
pub struct RetryingDeleter {
    backend: Arc<dyn SearchBackend>,
    backoff: Duration,
}

impl RetryingDeleter {
    pub fn new(backend: Arc<dyn SearchBackend>, backoff: Duration) -> Self {
        Self { backend, backoff }
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Delete `id`, retrying up to `tries` times while the backend reports
    /// the document as missing.
    pub async fn delete(
        &self,
        index: &str,
        type_name: &str,
        id: &str,
        tries: usize,
    ) -> Result<WriteAck, SyncError> {
        let start = Instant::now();
        let config = RetryConfig::fixed(self.backoff, tries);

        let backend = self.backend.as_ref();
        let result = retry_when("delete", &config, SyncError::is_not_found, move || async move {
            let ack = backend.delete(index, type_name, id).await?;
            ack.into_result()
        })
        .await;

        metrics::record_latency("delete", start.elapsed());
        metrics::record_operation("delete", if result.is_ok() { "success" } else { "error" });
        result
    }
}
