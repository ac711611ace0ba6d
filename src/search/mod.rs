//! Search request/response shapes and hydration.
//!
//! Responses follow the Elasticsearch layout (`hits.hits[]._id/_source`),
//! with anything the engine does not interpret kept in `extra`.

pub mod hydrate;

pub use hydrate::{hydrate, HydratedResponse};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::traits::QueryModifier;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub type_name: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitList {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub max_score: Option<f64>,
    pub hits: Vec<Hit>,
}

/// Backend search response. `hits` is `None` when the backend returned no
/// hit array, which hydration rejects as malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: Option<HitList>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchResponse {
    /// Response carrying the given hits.
    pub fn from_hits(hits: Vec<Hit>) -> Self {
        Self {
            hits: Some(HitList {
                total: hits.len() as u64,
                max_score: hits.iter().filter_map(|h| h.score).reduce(f64::max),
                hits,
            }),
            ..Default::default()
        }
    }

    /// Hit ids in response order (empty when there is no hit array).
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.hits
            .as_ref()
            .map(|list| list.hits.iter().map(|h| h.id.clone()).collect())
            .unwrap_or_default()
    }
}

/// A search call as sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub type_name: String,
    /// Query body (`{"query": ..., "highlight": ...}`)
    pub body: Value,
    /// Pass-through request parameters (`from`, `size`, `sort`, ...)
    pub params: Map<String, Value>,
}

/// Per-call search options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub index: Option<String>,
    pub type_name: Option<String>,
    /// Hydrate this call (hydration also happens when the config says always)
    pub hydrate: bool,
    /// Overrides the configured hydrate modifiers
    pub hydrate_options: Option<Vec<QueryModifier>>,
    /// Moved into the query body as `highlight`
    pub highlight: Option<Value>,
    pub params: Map<String, Value>,
}

impl SearchOptions {
    #[must_use]
    pub fn hydrated() -> Self {
        Self {
            hydrate: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}
