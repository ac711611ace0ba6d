//! Search API for SyncEngine
//!
//! ```text
//! search(body, options)
//!       │
//!       ├─→ options.highlight moved into the body
//!       ├─→ other options pass through as request params
//!       │
//!       ├─→ backend.search
//!       │
//!       └─→ hydrate (per call or always)?
//!                │
//!                └─→ one primary-store find for all hit ids
//! ```

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::SyncError;
use crate::metrics;
use crate::search::{hydrate, SearchOptions, SearchRequest};

use super::{SearchOutcome, SyncEngine};

impl SyncEngine {
    /// Run a search. `body` is the request body (`{"query": ...}`); `Null`
    /// sends an empty body.
    pub async fn search(&self, body: Value, options: SearchOptions) -> Result<SearchOutcome, SyncError> {
        let _timer = crate::time_operation!("search");

        let mut body = match body {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            other => return Err(SyncError::Validation(format!("search body must be an object, got {other}"))),
        };
        if let (Some(highlight), Value::Object(map)) = (options.highlight, &mut body) {
            map.insert("highlight".to_string(), highlight);
        }

        let request = SearchRequest {
            index: options.index.unwrap_or_else(|| self.index_name().to_string()),
            type_name: options.type_name.unwrap_or_else(|| self.type_name().to_string()),
            body,
            params: options.params,
        };

        let result = self.backend.search(&request).await;
        metrics::record_operation("search", if result.is_ok() { "success" } else { "error" });
        let response = result?;
        debug!(index = %request.index, hits = response.ids().len(), "Search complete");

        if !(options.hydrate || self.config.hydrate) {
            return Ok(SearchOutcome::Raw(response));
        }

        let modifiers = options
            .hydrate_options
            .as_deref()
            .unwrap_or(self.config.hydrate_options.as_slice());
        let hydrated = hydrate(response, self.store.as_ref(), modifiers).await?;
        Ok(SearchOutcome::Hydrated(hydrated))
    }

    /// Count documents matching `query` (everything when `None`).
    pub async fn count(&self, query: Option<Value>) -> Result<u64, SyncError> {
        let body = match query {
            Some(query) => json!({ "query": query }),
            None => json!({}),
        };
        let result = self.backend.count(self.index_name(), self.type_name(), &body).await;
        metrics::record_operation("count", if result.is_ok() { "success" } else { "error" });
        Ok(result?)
    }
}
