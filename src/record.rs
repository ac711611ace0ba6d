//! Record data structure.
//!
//! A [`Record`] is the unit the primary store hands to the engine: an
//! identity plus a JSON body. The identity doubles as the index document id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ID_PATH;

/// Predicate that keeps a record out of the index when it returns `true`.
pub type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// A record read from the primary store.
///
/// # Example
///
/// ```
/// use search_sync::Record;
/// use serde_json::json;
///
/// let record = Record::new("42", json!({"title": "Dune", "author": {"name": "Herbert"}}));
///
/// assert_eq!(record.get_path("author.name"), Some(json!("Herbert")));
/// assert_eq!(record.get_path("_id"), Some(json!("42")));
/// assert_eq!(record.routing_value("publisher"), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary store identity
    pub id: String,
    /// The record body
    pub content: Value,
}

impl Record {
    pub fn new(id: impl Into<String>, content: Value) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    /// Value at a dotted path. `_id` resolves to the record identity.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<Value> {
        if path == ID_PATH {
            return Some(Value::String(self.id.clone()));
        }
        lookup_path(&self.content, path).cloned()
    }

    /// Routing value for the backend: the value at `route_path`, or the
    /// identity when that value is missing or null. Non-strings are rendered
    /// as JSON text.
    #[must_use]
    pub fn routing_value(&self, route_path: &str) -> String {
        match self.get_path(route_path) {
            None | Some(Value::Null) => self.id.clone(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        }
    }

    /// Serialized form sent to the index.
    #[must_use]
    pub fn document(&self) -> Value {
        self.content.clone()
    }
}

/// Walk a dotted path (`author.name`) through nested objects.
/// Numeric segments index into arrays.
#[must_use]
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
