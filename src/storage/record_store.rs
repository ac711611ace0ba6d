//! In-memory primary record store.
//!
//! Filters use a small document-query dialect: `{path: value}` equality,
//! `{path: {"$in": [...]}}`, `{path: {"$eq": v}}`, and top-level `$or` /
//! `$and` arrays. `_id` addresses the record identity.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::traits::{PrimaryStore, QueryModifier, RecordCursor, StoreError, StoreQuery};
use crate::record::Record;

/// Does `record` satisfy `filter`?
pub fn filter_matches(filter: &Value, record: &Record) -> bool {
    let Value::Object(clauses) = filter else {
        return true;
    };
    clauses.iter().all(|(key, condition)| match key.as_str() {
        "$or" => condition
            .as_array()
            .is_some_and(|alts| alts.iter().any(|f| filter_matches(f, record))),
        "$and" => condition
            .as_array()
            .is_some_and(|all| all.iter().all(|f| filter_matches(f, record))),
        path => condition_matches(condition, record.get_path(path).as_ref()),
    })
}

fn condition_matches(condition: &Value, actual: Option<&Value>) -> bool {
    match condition {
        Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) && !ops.is_empty() => {
            ops.iter().all(|(op, operand)| match op.as_str() {
                "$in" => operand
                    .as_array()
                    .is_some_and(|candidates| actual.is_some_and(|a| candidates.contains(a))),
                "$eq" => actual == Some(operand),
                "$ne" => actual != Some(operand),
                _ => false,
            })
        }
        expected => actual == Some(expected),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Apply modifiers in order.
pub fn apply_modifiers(mut records: Vec<Record>, modifiers: &[QueryModifier]) -> Vec<Record> {
    for modifier in modifiers {
        match modifier {
            QueryModifier::Select(fields) => {
                for record in &mut records {
                    if let Value::Object(body) = &record.content {
                        let kept: Map<String, Value> = body
                            .iter()
                            .filter(|(k, _)| fields.iter().any(|f| f.split('.').next() == Some(k.as_str())))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        record.content = Value::Object(kept);
                    }
                }
            }
            QueryModifier::Sort { field, descending } => {
                records.sort_by(|a, b| {
                    let ord = compare_values(a.get_path(field).as_ref(), b.get_path(field).as_ref());
                    if *descending { ord.reverse() } else { ord }
                });
            }
            QueryModifier::Skip(n) => {
                records.drain(..(*n).min(records.len()));
            }
            QueryModifier::Limit(n) => records.truncate(*n),
        }
    }
    records
}

pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
    find_calls: AtomicUsize,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            find_calls: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, record: Record) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn remove(&self, id: &str) -> Option<Record> {
        self.records.write().remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Record> {
        self.records.read().get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of `find` calls served
    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    fn select(&self, query: &StoreQuery) -> Vec<Record> {
        let matched: Vec<Record> = self
            .records
            .read()
            .values()
            .filter(|record| filter_matches(&query.filter, record))
            .cloned()
            .collect();
        apply_modifiers(matched, &query.modifiers)
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrimaryStore for InMemoryRecordStore {
    async fn find(&self, query: &StoreQuery) -> Result<Vec<Record>, StoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.select(query))
    }

    async fn stream(&self, query: &StoreQuery, batch_size: usize) -> Result<Box<dyn RecordCursor>, StoreError> {
        Ok(Box::new(InMemoryCursor::new(self.select(query), batch_size)))
    }
}

/// Cursor over a snapshot taken when the stream was opened.
pub struct InMemoryCursor {
    records: VecDeque<Record>,
    batch_size: usize,
    paused: bool,
}

impl InMemoryCursor {
    pub fn new(records: Vec<Record>, batch_size: usize) -> Self {
        Self {
            records: records.into(),
            batch_size,
            paused: false,
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl RecordCursor for InMemoryCursor {
    async fn next(&mut self) -> Option<Result<Record, StoreError>> {
        if self.paused {
            return Some(Err(StoreError::Cursor("read from a paused cursor".into())));
        }
        self.records.pop_front().map(Ok)
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}
