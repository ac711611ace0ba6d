//! Interfaces of the two external collaborators: the search index backend
//! and the primary record store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::batching::operation::OpKind;
use crate::error::SyncError;
use crate::record::Record;
use crate::search::{SearchRequest, SearchResponse};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("search backend error: {0}")]
    Transport(String),
    #[error("rejected '{id}' ({status}): {reason}")]
    Rejected { id: String, status: u16, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("cursor failed: {0}")]
    Cursor(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err.to_string())
    }
}

/// Per-operation outcome reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    pub action: OpKind,
    #[serde(rename = "_id")]
    pub id: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteAck {
    /// Successful acknowledgement with the given backend result label.
    pub fn ok(action: OpKind, id: impl Into<String>, result: &str) -> Self {
        Self {
            action,
            id: id.into(),
            status: 200,
            result: Some(result.to_string()),
            error: None,
        }
    }

    /// Failed acknowledgement for a single item.
    pub fn failed(action: OpKind, id: impl Into<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            action,
            id: id.into(),
            status,
            result: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status < 300
    }

    /// Turn an item-level failure into an error.
    pub fn into_result(self) -> Result<WriteAck, SyncError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::Rejected {
                reason: self.error.clone().unwrap_or_else(|| "unknown".to_string()),
                status: self.status,
                id: self.id,
            })
        }
    }
}

/// Response to a bulk call: one item per submitted operation, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<WriteAck>,
}

/// A single-document upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub index: String,
    pub type_name: String,
    pub id: String,
    /// `{"doc": ..., "upsert": ...}`
    pub body: Value,
    pub routing: Option<String>,
    pub retry_on_conflict: u32,
}

impl UpdateRequest {
    /// Upsert of `document`: update if present, insert otherwise.
    pub fn upsert(
        index: impl Into<String>,
        type_name: impl Into<String>,
        id: impl Into<String>,
        document: Value,
    ) -> Self {
        Self {
            index: index.into(),
            type_name: type_name.into(),
            id: id.into(),
            body: json!({ "doc": document.clone(), "upsert": document }),
            routing: None,
            retry_on_conflict: 3,
        }
    }
}

/// Search index backend (Elasticsearch-style API).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    async fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<(), BackendError>;

    /// Apply `body` (`{type_name: mapping}`) to an existing index.
    async fn put_mapping(&self, index: &str, type_name: &str, body: &Value) -> Result<(), BackendError>;

    /// Alternating instruction/document entries. Delete instructions carry
    /// no document line.
    async fn bulk(&self, entries: &[Value]) -> Result<BulkResponse, BackendError>;

    async fn update(&self, request: &UpdateRequest) -> Result<WriteAck, BackendError>;

    /// Fails with [`BackendError::NotFound`] when the document is not visible.
    async fn delete(&self, index: &str, type_name: &str, id: &str) -> Result<WriteAck, BackendError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError>;

    async fn count(&self, index: &str, type_name: &str, body: &Value) -> Result<u64, BackendError>;

    async fn refresh(&self, index: &str) -> Result<(), BackendError>;

    /// Returns the number of deleted documents.
    async fn delete_by_query(&self, index: &str, type_name: &str, body: &Value) -> Result<u64, BackendError>;
}

/// Modifier applied to a primary-store query, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryModifier {
    /// Keep only these top-level fields of each record body
    Select(Vec<String>),
    /// Order by the value at `field`
    Sort {
        field: String,
        #[serde(default)]
        descending: bool,
    },
    Skip(usize),
    Limit(usize),
}

/// A primary-store query: a filter document plus ordered modifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreQuery {
    pub filter: Value,
    pub modifiers: Vec<QueryModifier>,
}

impl StoreQuery {
    pub fn new(filter: Value) -> Self {
        Self {
            filter,
            modifiers: Vec::new(),
        }
    }

    /// Every record (`{}` filter).
    pub fn all() -> Self {
        Self::new(json!({}))
    }

    /// Records whose identity is one of `ids`.
    pub fn by_ids(ids: &[String]) -> Self {
        Self::new(json!({ "_id": { "$in": ids } }))
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: impl IntoIterator<Item = QueryModifier>) -> Self {
        self.modifiers.extend(modifiers);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.modifiers.push(QueryModifier::Limit(n));
        self
    }
}

/// Primary record store.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    async fn find(&self, query: &StoreQuery) -> Result<Vec<Record>, StoreError>;

    /// Open a streaming cursor that fetches `batch_size` records at a time.
    async fn stream(&self, query: &StoreQuery, batch_size: usize) -> Result<Box<dyn RecordCursor>, StoreError>;
}

/// Streaming read over the primary store.
///
/// `pause`/`resume` are flow-control hints: a paused cursor stops
/// prefetching. The backfill driver never calls `next` while paused.
#[async_trait]
pub trait RecordCursor: Send {
    /// Next record, or `None` once the source is exhausted.
    async fn next(&mut self) -> Option<Result<Record, StoreError>>;

    fn pause(&mut self);

    fn resume(&mut self);

    fn is_paused(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_ack_into_result() {
        let ack = WriteAck::ok(OpKind::Update, "a", "updated");
        assert!(ack.clone().into_result().is_ok());

        let ack = WriteAck::failed(OpKind::Update, "b", 409, "version conflict");
        assert_eq!(
            ack.into_result(),
            Err(SyncError::Rejected {
                id: "b".into(),
                status: 409,
                reason: "version conflict".into(),
            })
        );
    }

    #[test]
    fn test_write_ack_wire_shape() {
        let ack: WriteAck = serde_json::from_value(json!({
            "action": "delete", "_id": "x", "status": 404, "error": "not_found"
        }))
        .unwrap();
        assert_eq!(ack.action, OpKind::Delete);
        assert!(!ack.is_success());
    }

    #[test]
    fn test_upsert_body() {
        let request = UpdateRequest::upsert("books", "book", "1", json!({"t": 1}));
        assert_eq!(request.body, json!({"doc": {"t": 1}, "upsert": {"t": 1}}));
        assert_eq!(request.retry_on_conflict, 3);
    }

    #[test]
    fn test_store_query_builders() {
        let query = StoreQuery::by_ids(&["a".into(), "b".into()])
            .with_modifiers([QueryModifier::Select(vec!["title".into()])])
            .limit(10);
        assert_eq!(query.filter, json!({"_id": {"$in": ["a", "b"]}}));
        assert_eq!(query.modifiers.len(), 2);
        assert_eq!(query.modifiers[1], QueryModifier::Limit(10));
    }
}
