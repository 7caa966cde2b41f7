//! Two-round-trip search: ranked ids from the index tier, payloads from KV.

use docsync_core::error::Result;
use docsync_core::traits::{Collection, Embedder};
use docsync_core::types::{DocId, Filters, LogicalDocument, SearchRequest, StoredRecord};

use crate::index::SearchTier;

/// Builds the vector request for `embedding`. Non-empty filters are passed
/// through to the search service untouched.
pub fn vector_request(embedding: Vec<f32>, limit: usize, filters: Option<&Filters>) -> SearchRequest {
    let mut request = SearchRequest::vector(embedding, limit);
    request.raw = filters.filter(|f| !f.is_empty()).cloned();
    request
}

/// Runs a vector search and returns the hits as documents, best first.
///
/// An embedding failure yields no results. Hits whose record cannot be
/// fetched are dropped.
pub fn search(
    tier: &dyn SearchTier,
    index: &str,
    collection: &dyn Collection,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
    filters: Option<&Filters>,
) -> Result<Vec<LogicalDocument>> {
    let embedding = match embedder.embed(query) {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::error!("failed to embed query: {e}");
            return Ok(Vec::new());
        }
    };

    let request = vector_request(embedding, limit, filters);
    let result = tier.search(index, &request)?;
    let ids: Vec<DocId> = result.rows().iter().map(|hit| hit.id.clone()).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let fetched = collection.get_multi(&ids)?;
    let mut documents = Vec::with_capacity(ids.len());
    for id in ids {
        let value = match fetched.results.get(&id) {
            Some(Ok(value)) => value.clone(),
            Some(Err(e)) => {
                tracing::warn!("skipping hit {id}: {e}");
                continue;
            }
            None => {
                tracing::warn!("skipping hit {id}: not returned by fetch");
                continue;
            }
        };
        match StoredRecord::from_value(id.clone(), value) {
            Ok(record) => documents.push(record.into_document()),
            Err(e) => tracing::warn!("skipping hit {id}: malformed record: {e}"),
        }
    }
    Ok(documents)
}

/// Indexed document count; errors read as 0.
pub fn get_count(tier: &dyn SearchTier, index: &str) -> u64 {
    match tier.indexes().get_indexed_documents_count(index) {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("error getting document count: {e}");
            0
        }
    }
}
