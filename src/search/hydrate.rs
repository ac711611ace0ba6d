//! Hydration: swap hit summaries for the authoritative records.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::SearchResponse;
use crate::error::SyncError;
use crate::metrics;
use crate::storage::traits::{PrimaryStore, QueryModifier, StoreQuery};

/// A search response whose hits carry primary-store content.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedResponse {
    pub response: SearchResponse,
    /// `_source` of each hit in hit order. Hits whose record was not found
    /// keep the index's copy.
    pub sources: Vec<Value>,
}

/// Fetch every hit's record in one store query and overwrite the hit
/// `_source` in place. Hit order is preserved regardless of the order the
/// store returns records in.
pub async fn hydrate(
    mut response: SearchResponse,
    store: &dyn PrimaryStore,
    modifiers: &[QueryModifier],
) -> Result<HydratedResponse, SyncError> {
    let Some(hit_list) = response.hits.as_mut() else {
        return Err(SyncError::Validation("search response has no hit array".into()));
    };

    if hit_list.hits.is_empty() {
        return Ok(HydratedResponse {
            response,
            sources: Vec::new(),
        });
    }

    let ids: Vec<String> = hit_list.hits.iter().map(|h| h.id.clone()).collect();
    let positions: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

    let query = StoreQuery::by_ids(&ids).with_modifiers(modifiers.iter().cloned());
    let records = store.find(&query).await?;

    let mut fetched = 0;
    for record in records {
        if let Some(&pos) = positions.get(record.id.as_str()) {
            hit_list.hits[pos].source = record.content;
            fetched += 1;
        }
    }

    debug!(hits = ids.len(), fetched, "Hydrated search hits");
    metrics::record_hydration(ids.len(), fetched);

    let sources = hit_list.hits.iter().map(|h| h.source.clone()).collect();
    Ok(HydratedResponse { response, sources })
}
