// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine-level error taxonomy.
//!
//! [`SyncError`] is `Clone` because a single batch failure is fanned out to
//! every caller that contributed an operation to that batch.

use thiserror::Error;

use crate::storage::traits::BackendError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Backend unreachable or the request was refused at the transport level.
    #[error("transport error: {0}")]
    Transport(String),

    /// Delete target not (yet) visible in the index.
    #[error("document '{id}' not found")]
    NotFound { id: String },

    /// The bulk response did not carry one item per queued operation.
    #[error("bulk result count {actual} does not match queued operation count {expected}")]
    BatchCountMismatch { expected: usize, actual: usize },

    /// Index creation or mapping application failed.
    #[error("failed to apply mapping on index '{index}': {reason}")]
    MappingApply { index: String, reason: String },

    /// Malformed search response or request.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend accepted the batch but rejected this item.
    #[error("backend rejected '{id}' with status {status}: {reason}")]
    Rejected { id: String, status: u16, reason: String },

    /// Primary store query failed.
    #[error("primary store error: {0}")]
    Store(String),

    /// The completion channel closed before a result was delivered.
    #[error("operation dropped before completion")]
    Dropped,
}

impl SyncError {
    /// Whether this error is the transient "not found" a delete may retry on.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(id) => Self::NotFound { id },
            BackendError::Transport(msg) => Self::Transport(msg),
            BackendError::Rejected { id, status, reason } => Self::Rejected { id, status, reason },
        }
    }
}
