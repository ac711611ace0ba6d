//! Public types for the sync engine coordinator.

use crate::error::SyncError;
use crate::search::{HydratedResponse, SearchResponse};
use crate::storage::traits::WriteAck;

/// Per-call index/type overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub index: Option<String>,
    pub type_name: Option<String>,
}

impl IndexOptions {
    #[must_use]
    pub fn index(index: impl Into<String>) -> Self {
        Self {
            index: Some(index.into()),
            type_name: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }
}

/// What happened to a record handed to `index`.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    /// The backend acknowledged the write
    Written(WriteAck),
    /// The configured filter kept the record out of the index
    Skipped,
}

impl IndexOutcome {
    #[must_use]
    pub fn ack(&self) -> Option<&WriteAck> {
        match self {
            Self::Written(ack) => Some(ack),
            Self::Skipped => None,
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Result of [`super::SyncEngine::search`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Raw(SearchResponse),
    Hydrated(HydratedResponse),
}

impl SearchOutcome {
    /// The backend response (hydrated in place when hydration ran).
    #[must_use]
    pub fn response(&self) -> &SearchResponse {
        match self {
            Self::Raw(response) => response,
            Self::Hydrated(hydrated) => &hydrated.response,
        }
    }

    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        matches!(self, Self::Hydrated(_))
    }
}

/// Lifecycle notifications, delivered to [`super::SyncEngine::subscribe`]rs.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A saved record was written to the index (or the write failed)
    Indexed { id: String, result: Result<WriteAck, SyncError> },
    /// A removed record was deleted from the index (or the delete failed)
    Removed { id: String, result: Result<WriteAck, SyncError> },
}

impl SyncEvent {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Indexed { id, .. } | Self::Removed { id, .. } => id,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        match self {
            Self::Indexed { result, .. } | Self::Removed { result, .. } => result.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::operation::OpKind;

    #[test]
    fn test_index_outcome_accessors() {
        let written = IndexOutcome::Written(WriteAck::ok(OpKind::Update, "a", "created"));
        assert_eq!(written.ack().map(|a| a.id.as_str()), Some("a"));
        assert!(!written.is_skipped());
        assert!(IndexOutcome::Skipped.ack().is_none());
    }

    #[test]
    fn test_sync_event_accessors() {
        let removed = SyncEvent::Removed {
            id: "b".into(),
            result: Err(SyncError::NotFound { id: "b".into() }),
        };
        assert_eq!(removed.id(), "b");
        assert!(!removed.is_ok());
    }

    #[test]
    fn test_index_options_builder() {
        let options = IndexOptions::index("archive").with_type("page");
        assert_eq!(options.index.as_deref(), Some("archive"));
        assert_eq!(options.type_name.as_deref(), Some("page"));
    }
}
