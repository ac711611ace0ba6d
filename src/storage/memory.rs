//! In-memory search backend.
//!
//! Implements the subset of Elasticsearch behavior the engine relies on:
//! index existence/creation, mappings, bulk (`index`/`update`/`delete`),
//! upserts, deletes that report missing documents, and `match_all`/`term`/
//! `match` queries. Indices are auto-created on first write, like the real
//! thing.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use super::traits::{BackendError, BulkResponse, SearchBackend, UpdateRequest, WriteAck};
use crate::batching::operation::OpKind;
use crate::record::lookup_path;
use crate::search::{Hit, SearchRequest, SearchResponse};

/// One decoded bulk action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BulkAction {
    pub kind: OpKind,
    pub index: String,
    pub type_name: String,
    pub id: String,
    pub document: Option<Value>,
}

/// Decode alternating instruction/document lines.
pub(crate) fn parse_bulk_entries(entries: &[Value]) -> Result<Vec<BulkAction>, BackendError> {
    let mut actions = Vec::new();
    let mut lines = entries.iter();

    while let Some(line) = lines.next() {
        let instruction = line
            .as_object()
            .filter(|obj| obj.len() == 1)
            .ok_or_else(|| BackendError::Transport(format!("malformed bulk instruction: {line}")))?;
        let (action, meta) = instruction
            .iter()
            .next()
            .ok_or_else(|| BackendError::Transport("empty bulk instruction".into()))?;
        let kind = match action.as_str() {
            "index" => OpKind::Index,
            "update" => OpKind::Update,
            "delete" => OpKind::Delete,
            other => return Err(BackendError::Transport(format!("unknown bulk action '{other}'"))),
        };
        let field = |key: &str| {
            meta.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| BackendError::Transport(format!("bulk {action} missing {key}")))
        };
        let (index, type_name, id) = (field("_index")?, field("_type")?, field("_id")?);

        let document = match kind {
            OpKind::Delete => None,
            OpKind::Index | OpKind::Update => Some(
                lines
                    .next()
                    .cloned()
                    .ok_or_else(|| BackendError::Transport(format!("bulk {action} '{id}' missing document line")))?,
            ),
        };

        actions.push(BulkAction { kind, index, type_name, id, document });
    }

    Ok(actions)
}

/// Does `doc` satisfy an Elasticsearch-style `query` clause?
/// `None` and `match_all` match everything; `term` is exact equality;
/// `match` is case-insensitive substring on strings, equality otherwise.
pub(crate) fn query_matches(query: Option<&Value>, doc: &Value) -> bool {
    let Some(Value::Object(clause)) = query else {
        return true;
    };
    clause.iter().all(|(kind, spec)| {
        let Some(fields) = spec.as_object() else {
            return kind == "match_all";
        };
        match kind.as_str() {
            "match_all" => true,
            "term" => fields.iter().all(|(path, expected)| {
                let expected = expected.get("value").unwrap_or(expected);
                lookup_path(doc, path) == Some(expected)
            }),
            "match" => fields.iter().all(|(path, expected)| {
                let expected = expected.get("query").unwrap_or(expected);
                match (lookup_path(doc, path), expected) {
                    (Some(Value::String(actual)), Value::String(wanted)) => {
                        actual.to_lowercase().contains(&wanted.to_lowercase())
                    }
                    (actual, wanted) => actual == Some(wanted),
                }
            }),
            _ => false,
        }
    })
}

#[derive(Debug, Default)]
struct IndexData {
    settings: Option<Value>,
    mappings: HashMap<String, Value>,
    /// (type, id) → document
    docs: BTreeMap<(String, String), Value>,
}

impl IndexData {
    fn upsert(&mut self, type_name: &str, id: &str, body: &Value) -> &'static str {
        let key = (type_name.to_string(), id.to_string());
        match self.docs.get_mut(&key) {
            Some(existing) => {
                if let (Value::Object(target), Some(Value::Object(patch))) = (existing, body.get("doc")) {
                    for (k, v) in patch {
                        target.insert(k.clone(), v.clone());
                    }
                }
                "updated"
            }
            None => {
                let doc = body
                    .get("upsert")
                    .or_else(|| body.get("doc"))
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                self.docs.insert(key, doc);
                "created"
            }
        }
    }

    fn matching<'a>(&'a self, type_name: &'a str, query: Option<&'a Value>) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
        self.docs
            .iter()
            .filter(move |((t, _), doc)| t == type_name && query_matches(query, doc))
            .map(|((_, id), doc)| (id, doc))
    }
}

pub struct InMemoryBackend {
    indices: DashMap<String, IndexData>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indices: DashMap::new(),
        }
    }

    /// Stored document, if any
    #[must_use]
    pub fn document(&self, index: &str, type_name: &str, id: &str) -> Option<Value> {
        self.indices
            .get(index)
            .and_then(|data| data.docs.get(&(type_name.to_string(), id.to_string())).cloned())
    }

    /// Number of documents in an index (all types)
    #[must_use]
    pub fn doc_count(&self, index: &str) -> usize {
        self.indices.get(index).map_or(0, |data| data.docs.len())
    }

    /// Mapping applied to `type_name`, if any
    #[must_use]
    pub fn mapping(&self, index: &str, type_name: &str) -> Option<Value> {
        self.indices
            .get(index)
            .and_then(|data| data.mappings.get(type_name).cloned())
    }

    /// Settings the index was created with
    #[must_use]
    pub fn settings(&self, index: &str) -> Option<Value> {
        self.indices.get(index).and_then(|data| data.settings.clone())
    }

    fn apply(&self, action: BulkAction) -> WriteAck {
        let mut data = self.indices.entry(action.index.clone()).or_default();
        match (action.kind, action.document) {
            (OpKind::Update, Some(body)) => {
                let result = data.upsert(&action.type_name, &action.id, &body);
                WriteAck::ok(OpKind::Update, action.id, result)
            }
            (OpKind::Index, Some(doc)) => {
                let previous = data.docs.insert((action.type_name, action.id.clone()), doc);
                let result = if previous.is_some() { "updated" } else { "created" };
                WriteAck::ok(OpKind::Index, action.id, result)
            }
            (OpKind::Delete, _) => match data.docs.remove(&(action.type_name, action.id.clone())) {
                Some(_) => WriteAck::ok(OpKind::Delete, action.id, "deleted"),
                None => WriteAck::failed(OpKind::Delete, action.id, 404, "not_found"),
            },
            (kind, None) => WriteAck::failed(kind, action.id, 400, "missing document"),
        }
    }

    fn index_missing(index: &str) -> BackendError {
        BackendError::Rejected {
            id: index.to_string(),
            status: 404,
            reason: "index_not_found_exception".to_string(),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        Ok(self.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: Option<&Value>) -> Result<(), BackendError> {
        match self.indices.entry(index.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BackendError::Rejected {
                id: index.to_string(),
                status: 400,
                reason: "resource_already_exists_exception".to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(IndexData {
                    settings: settings.cloned(),
                    ..Default::default()
                });
                Ok(())
            }
        }
    }

    async fn put_mapping(&self, index: &str, type_name: &str, body: &Value) -> Result<(), BackendError> {
        let mut data = self.indices.get_mut(index).ok_or_else(|| Self::index_missing(index))?;
        let mapping = body.get(type_name).cloned().unwrap_or_else(|| body.clone());
        data.mappings.insert(type_name.to_string(), mapping);
        Ok(())
    }

    async fn bulk(&self, entries: &[Value]) -> Result<BulkResponse, BackendError> {
        let actions = parse_bulk_entries(entries)?;
        let items: Vec<WriteAck> = actions.into_iter().map(|action| self.apply(action)).collect();
        let errors = items.iter().any(|item| !item.is_success());
        Ok(BulkResponse { took: 0, errors, items })
    }

    async fn update(&self, request: &UpdateRequest) -> Result<WriteAck, BackendError> {
        let mut data = self.indices.entry(request.index.clone()).or_default();
        let result = data.upsert(&request.type_name, &request.id, &request.body);
        Ok(WriteAck::ok(OpKind::Update, request.id.clone(), result))
    }

    async fn delete(&self, index: &str, type_name: &str, id: &str) -> Result<WriteAck, BackendError> {
        let removed = self
            .indices
            .get_mut(index)
            .and_then(|mut data| data.docs.remove(&(type_name.to_string(), id.to_string())));
        match removed {
            Some(_) => Ok(WriteAck::ok(OpKind::Delete, id, "deleted")),
            None => Err(BackendError::NotFound(id.to_string())),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        let data = self
            .indices
            .get(&request.index)
            .ok_or_else(|| Self::index_missing(&request.index))?;

        let param = |key: &str| {
            request
                .params
                .get(key)
                .or_else(|| request.body.get(key))
                .and_then(Value::as_u64)
                .map(|n| n as usize)
        };
        let from = param("from").unwrap_or(0);
        let size = param("size").unwrap_or(10);
        let highlight = request.body.get("highlight").cloned();

        let matching: Vec<(&String, &Value)> = data.matching(&request.type_name, request.body.get("query")).collect();
        let total = matching.len() as u64;
        let hits: Vec<Hit> = matching
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, doc)| Hit {
                index: request.index.clone(),
                type_name: request.type_name.clone(),
                id: id.clone(),
                score: Some(1.0),
                source: doc.clone(),
                highlight: highlight.clone(),
            })
            .collect();

        let mut response = SearchResponse::from_hits(hits);
        if let Some(list) = response.hits.as_mut() {
            list.total = total;
        }
        Ok(response)
    }

    async fn count(&self, index: &str, type_name: &str, body: &Value) -> Result<u64, BackendError> {
        let data = self.indices.get(index).ok_or_else(|| Self::index_missing(index))?;
        Ok(data.matching(type_name, body.get("query")).count() as u64)
    }

    async fn refresh(&self, index: &str) -> Result<(), BackendError> {
        if self.indices.contains_key(index) {
            Ok(())
        } else {
            Err(Self::index_missing(index))
        }
    }

    async fn delete_by_query(&self, index: &str, type_name: &str, body: &Value) -> Result<u64, BackendError> {
        let mut data = self.indices.get_mut(index).ok_or_else(|| Self::index_missing(index))?;
        let doomed: Vec<(String, String)> = data
            .matching(type_name, body.get("query"))
            .map(|(id, _)| (type_name.to_string(), id.clone()))
            .collect();
        for key in &doomed {
            data.docs.remove(key);
        }
        Ok(doomed.len() as u64)
    }
}
