// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One-shot index creation.
//!
//! Many call sites may try to "ensure the mapping exists" for the same index
//! at the same time, typically right after startup. The backend rejects a
//! second create for an index that is being created, so creation is
//! serialized through a per-index state machine:
//!
//! ```text
//!             exists? ──yes──► put_mapping
//!               │ no
//!               ▼
//!   Unknown ──► Creating ──create ok──► replay queued jobs ──► Ready ──► put_mapping
//!               │   ▲                  (arrival order)
//!               │   └── concurrent callers queue a job and wait
//!               └──create failed──► every queued caller gets the error, back to Unknown
//! ```
//!
//! The state check and transition happen under a synchronous lock with no
//! await in between, which is what makes "one create in flight per index"
//! hold.
//!
//! If the creating caller is dropped mid-create (a timeout, a losing
//! `select!` branch, an aborted task), its `CreationGuard` resets the index
//! to Unknown and fails the queued callers with [`SyncError::Dropped`], so
//! the next caller starts a fresh attempt.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::metrics;
use crate::storage::traits::SearchBackend;

/// Observable creation phase for an index name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPhase {
    /// Never seen, or a previous creation failed
    Unknown,
    /// A create call is in flight; `queued` callers wait behind it
    Creating { queued: usize },
    /// Created by this process
    Ready,
}

/// A mapping application deferred until the in-flight create resolves.
struct DeferredJob {
    type_name: String,
    body: Value,
    reply: oneshot::Sender<Result<(), SyncError>>,
}

enum IndexCreationState {
    Creating { deferred: Vec<DeferredJob> },
    Ready,
}

type States = Mutex<HashMap<String, IndexCreationState>>;

/// Held by the caller driving a creation. Dropped while still armed, it
/// clears the `Creating` entry and fails whatever is queued behind it.
struct CreationGuard<'a> {
    states: &'a States,
    index: &'a str,
    armed: bool,
}

impl<'a> CreationGuard<'a> {
    fn new(states: &'a States, index: &'a str) -> Self {
        Self {
            states,
            index,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let queued = {
            let mut states = self.states.lock();
            if !matches!(states.get(self.index), Some(IndexCreationState::Creating { .. })) {
                return;
            }
            match states.remove(self.index) {
                Some(IndexCreationState::Creating { deferred }) => deferred,
                _ => Vec::new(),
            }
        };
        warn!(index = self.index, queued = queued.len(), "Index creation abandoned, resetting");
        for job in queued {
            let _ = job.reply.send(Err(SyncError::Dropped));
        }
    }
}

enum NextStep {
    Create,
    Wait(oneshot::Receiver<Result<(), SyncError>>),
    Apply,
}

/// Serializes index creation per index name.
///
/// Clones share state. [`IndexCreationCoordinator::global`] returns the
/// process-wide instance engines use by default.
#[derive(Clone, Default)]
pub struct IndexCreationCoordinator {
    states: Arc<States>,
}

impl IndexCreationCoordinator {
    /// An isolated coordinator (tests, or engines that must not share state).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide coordinator.
    #[must_use]
    pub fn global() -> Self {
        static GLOBAL: OnceLock<IndexCreationCoordinator> = OnceLock::new();
        GLOBAL.get_or_init(IndexCreationCoordinator::new).clone()
    }

    #[must_use]
    pub fn phase(&self, index: &str) -> CreationPhase {
        match self.states.lock().get(index) {
            None => CreationPhase::Unknown,
            Some(IndexCreationState::Creating { deferred }) => CreationPhase::Creating { queued: deferred.len() },
            Some(IndexCreationState::Ready) => CreationPhase::Ready,
        }
    }

    /// Make sure `index` exists and `mapping` is applied to `type_name`.
    ///
    /// `settings` is only used if this call ends up creating the index.
    pub async fn ensure_mapping(
        &self,
        backend: &dyn SearchBackend,
        index: &str,
        type_name: &str,
        mapping: &Value,
        settings: Option<&Value>,
    ) -> Result<(), SyncError> {
        let mut wrapped = Map::new();
        wrapped.insert(type_name.to_string(), mapping.clone());
        let body = Value::Object(wrapped);

        if backend.index_exists(index).await? {
            return put_mapping(backend, index, type_name, &body).await;
        }

        let next = {
            let mut states = self.states.lock();
            match states.get_mut(index) {
                None => {
                    states.insert(index.to_string(), IndexCreationState::Creating { deferred: Vec::new() });
                    NextStep::Create
                }
                Some(IndexCreationState::Creating { deferred }) => {
                    let (reply, rx) = oneshot::channel();
                    deferred.push(DeferredJob {
                        type_name: type_name.to_string(),
                        body: body.clone(),
                        reply,
                    });
                    debug!(index, type_name, queued = deferred.len(), "Index creation in flight, mapping queued");
                    NextStep::Wait(rx)
                }
                Some(IndexCreationState::Ready) => NextStep::Apply,
            }
        };

        match next {
            NextStep::Apply => put_mapping(backend, index, type_name, &body).await,
            NextStep::Wait(rx) => rx.await.unwrap_or(Err(SyncError::Dropped)),
            NextStep::Create => self.create_then_apply(backend, index, type_name, &body, settings).await,
        }
    }

    async fn create_then_apply(
        &self,
        backend: &dyn SearchBackend,
        index: &str,
        type_name: &str,
        body: &Value,
        settings: Option<&Value>,
    ) -> Result<(), SyncError> {
        info!(index, "Creating index");
        let mut guard = CreationGuard::new(&self.states, index);

        if let Err(e) = backend.create_index(index, settings).await {
            let err = SyncError::MappingApply {
                index: index.to_string(),
                reason: e.to_string(),
            };
            let queued = match self.states.lock().remove(index) {
                Some(IndexCreationState::Creating { deferred }) => deferred,
                _ => Vec::new(),
            };
            guard.disarm();
            if queued.is_empty() {
                error!(index, error = %err, "Index creation failed");
            } else {
                error!(index, queued = queued.len(), error = %err, "Index creation failed, failing queued mapping requests");
            }
            for job in queued {
                let _ = job.reply.send(Err(err.clone()));
            }
            return Err(err);
        }

        metrics::record_index_created();

        // Jobs queued while replaying are picked up by the next round; the
        // state only becomes Ready once the queue is observed empty.
        loop {
            let jobs = {
                let mut states = self.states.lock();
                match states.get_mut(index) {
                    Some(IndexCreationState::Creating { deferred }) if !deferred.is_empty() => {
                        std::mem::take(deferred)
                    }
                    _ => {
                        states.insert(index.to_string(), IndexCreationState::Ready);
                        guard.disarm();
                        break;
                    }
                }
            };
            debug!(index, jobs = jobs.len(), "Replaying queued mapping requests");
            for job in jobs {
                let result = put_mapping(backend, index, &job.type_name, &job.body).await;
                let _ = job.reply.send(result);
            }
        }

        info!(index, "Index created");
        put_mapping(backend, index, type_name, body).await
    }
}

async fn put_mapping(
    backend: &dyn SearchBackend,
    index: &str,
    type_name: &str,
    body: &Value,
) -> Result<(), SyncError> {
    backend
        .put_mapping(index, type_name, body)
        .await
        .map_err(|e| SyncError::MappingApply {
            index: index.to_string(),
            reason: e.to_string(),
        })
}
