//! Index write intents and their bulk wire form.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::record::Record;

/// Kind of index write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Full document write
    Index,
    /// Partial update with upsert
    Update,
    Delete,
}

impl OpKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical write destined for the index. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    kind: OpKind,
    index: String,
    type_name: String,
    record_id: String,
    routing: Option<String>,
    document: Option<Value>,
    retry_on_conflict: u32,
}

impl Operation {
    /// Upsert of `document` under `record_id`.
    pub fn update(
        index: impl Into<String>,
        type_name: impl Into<String>,
        record_id: impl Into<String>,
        document: Value,
        retry_on_conflict: u32,
    ) -> Self {
        Self {
            kind: OpKind::Update,
            index: index.into(),
            type_name: type_name.into(),
            record_id: record_id.into(),
            routing: None,
            document: Some(document),
            retry_on_conflict,
        }
    }

    /// Full replace of the document under `record_id`.
    pub fn index(
        index: impl Into<String>,
        type_name: impl Into<String>,
        record_id: impl Into<String>,
        document: Value,
    ) -> Self {
        Self {
            kind: OpKind::Index,
            index: index.into(),
            type_name: type_name.into(),
            record_id: record_id.into(),
            routing: None,
            document: Some(document),
            retry_on_conflict: 0,
        }
    }

    pub fn delete(
        index: impl Into<String>,
        type_name: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: OpKind::Delete,
            index: index.into(),
            type_name: type_name.into(),
            record_id: record_id.into(),
            routing: None,
            document: None,
            retry_on_conflict: 0,
        }
    }

    #[must_use]
    pub fn with_routing(mut self, routing: Option<String>) -> Self {
        self.routing = routing;
        self
    }

    #[must_use]
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    #[must_use]
    pub fn routing(&self) -> Option<&str> {
        self.routing.as_deref()
    }

    #[must_use]
    pub fn document(&self) -> Option<&Value> {
        self.document.as_ref()
    }

    /// Number of wire entries this operation expands to.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match self.kind {
            OpKind::Delete => 1,
            OpKind::Index | OpKind::Update => 2,
        }
    }

    /// Bulk wire entries: an instruction line, then the document line for
    /// index/update.
    #[must_use]
    pub fn to_entries(&self) -> Vec<Value> {
        let mut meta = Map::new();
        meta.insert("_index".into(), Value::String(self.index.clone()));
        meta.insert("_type".into(), Value::String(self.type_name.clone()));
        meta.insert("_id".into(), Value::String(self.record_id.clone()));
        if self.kind == OpKind::Update {
            meta.insert("_retry_on_conflict".into(), json!(self.retry_on_conflict));
        }
        if let Some(routing) = &self.routing {
            meta.insert("_routing".into(), Value::String(routing.clone()));
        }

        let mut instruction = Map::new();
        instruction.insert(self.kind.as_str().into(), Value::Object(meta));
        let instruction = Value::Object(instruction);

        match (&self.kind, &self.document) {
            (OpKind::Update, Some(doc)) => {
                vec![instruction, json!({ "doc": doc, "upsert": doc })]
            }
            (OpKind::Index, Some(doc)) => vec![instruction, doc.clone()],
            (OpKind::Index | OpKind::Update, None) => vec![instruction, json!({})],
            (OpKind::Delete, _) => vec![instruction],
        }
    }
}

/// Builds operations for one index target from records.
#[derive(Debug, Clone)]
pub struct OperationFactory {
    pub index: String,
    pub type_name: String,
    pub route_path: Option<String>,
    pub retry_on_conflict: u32,
}

impl OperationFactory {
    /// Upsert operation for `record`, routed if a route path is configured.
    #[must_use]
    pub fn upsert(&self, record: &Record) -> Operation {
        Operation::update(
            &self.index,
            &self.type_name,
            &record.id,
            record.document(),
            self.retry_on_conflict,
        )
        .with_routing(self.routing_for(record))
    }

    #[must_use]
    pub fn delete(&self, record: &Record) -> Operation {
        Operation::delete(&self.index, &self.type_name, &record.id)
    }

    #[must_use]
    pub fn routing_for(&self, record: &Record) -> Option<String> {
        self.route_path.as_deref().map(|path| record.routing_value(path))
    }

    /// Same factory aimed at another index/type.
    #[must_use]
    pub fn retarget(&self, index: Option<&str>, type_name: Option<&str>) -> Self {
        Self {
            index: index.map_or_else(|| self.index.clone(), str::to_string),
            type_name: type_name.map_or_else(|| self.type_name.clone(), str::to_string),
            route_path: self.route_path.clone(),
            retry_on_conflict: self.retry_on_conflict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_expands_to_two_entries() {
        let op = Operation::update("books", "book", "1", json!({"title": "Dune"}), 3)
            .with_routing(Some("shelf-a".into()));
        let entries = op.to_entries();

        assert_eq!(op.entry_count(), 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            json!({"update": {
                "_index": "books", "_type": "book", "_id": "1",
                "_retry_on_conflict": 3, "_routing": "shelf-a"
            }})
        );
        assert_eq!(entries[1], json!({"doc": {"title": "Dune"}, "upsert": {"title": "Dune"}}));
    }

    #[test]
    fn test_index_and_delete_entries() {
        let op = Operation::index("books", "book", "2", json!({"title": "Emma"}));
        let entries = op.to_entries();
        assert_eq!(entries[0], json!({"index": {"_index": "books", "_type": "book", "_id": "2"}}));
        assert_eq!(entries[1], json!({"title": "Emma"}));

        let op = Operation::delete("books", "book", "3");
        assert_eq!(op.entry_count(), 1);
        assert_eq!(
            op.to_entries(),
            vec![json!({"delete": {"_index": "books", "_type": "book", "_id": "3"}})]
        );
    }

    #[test]
    fn test_factory_routes_and_retargets() {
        let factory = OperationFactory {
            index: "books".into(),
            type_name: "book".into(),
            route_path: Some("shelf".into()),
            retry_on_conflict: 3,
        };
        let record = Record::new("9", json!({"shelf": "b2"}));

        let op = factory.upsert(&record);
        assert_eq!(op.routing(), Some("b2"));
        assert_eq!(op.kind(), OpKind::Update);

        let other = factory.retarget(Some("archive"), None);
        let op = other.delete(&record);
        assert_eq!(op.index_name(), "archive");
        assert_eq!(op.type_name(), "book");
        assert_eq!(op.routing(), None);
    }
}
