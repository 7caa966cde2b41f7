//! Index tier through the search service.

use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

use docsync_core::error::{BackendError, BackendResult};
use docsync_core::traits::SearchIndexManager;
use docsync_core::types::{IndexDefinition, SearchHit, SearchRequest, SearchResult};

use crate::cluster::Session;
use crate::http::Body;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IndexScope {
    Global,
    Scope { bucket: String, scope: String },
}

impl IndexScope {
    /// Name the stats endpoint keys a scoped index by.
    fn stats_key(&self, name: &str) -> String {
        match self {
            Self::Global => name.to_string(),
            Self::Scope { bucket, scope } => format!("{bucket}.{scope}.{name}"),
        }
    }
}

pub(crate) struct RestIndexManager {
    session: Arc<Session>,
    scope: IndexScope,
}

impl RestIndexManager {
    pub(crate) fn new(session: Arc<Session>, scope: IndexScope) -> Self {
        Self { session, scope }
    }

    fn index_url(&self, name: &str) -> String {
        let root = match &self.scope {
            IndexScope::Global => self.session.endpoints.index_root(None),
            IndexScope::Scope { bucket, scope } => self.session.endpoints.index_root(Some((bucket, scope))),
        };
        format!("{root}/{name}")
    }

    pub(crate) fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult> {
        let body = search_body(request);
        let response = self
            .session
            .client
            .send(Method::POST, &format!("{}/query", self.index_url(index)), Body::Json(&body))?
            .into_json(|| BackendError::IndexNotFound(index.to_string()))?;
        Ok(SearchResult { hits: parse_hits(&response) })
    }

    /// Partitions serving versus planned. Missing stats read as not serving.
    fn partitions(&self, name: &str) -> (u64, u64) {
        let url = self.session.endpoints.stats(&self.scope.stats_key(name));
        let stats = self.session.client.get(&url).and_then(|reply| reply.json());
        match stats {
            Ok(stats) => partition_counts(&stats),
            Err(e) => {
                tracing::debug!("no stats for index {name}: {e}");
                (0, 1)
            }
        }
    }
}

/// Vector request body. Raw options are merged into the top level verbatim.
pub(crate) fn search_body(request: &SearchRequest) -> Value {
    let mut body = json!({
        "query": { "match_none": {} },
        "knn": [{
            "field": request.vector_query.field_name,
            "vector": request.vector_query.vector,
            "k": request.vector_query.num_candidates,
        }],
        "size": request.limit,
        "fields": request.fields,
    });
    if let (Some(raw), Some(obj)) = (&request.raw, body.as_object_mut()) {
        for (key, value) in raw {
            obj.insert(key.clone(), value.clone());
        }
    }
    body
}

pub(crate) fn parse_hits(response: &Value) -> Vec<SearchHit> {
    response
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    Some(SearchHit {
                        id: hit.get("id")?.as_str()?.to_string(),
                        score: hit.get("score").and_then(Value::as_f64).unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn partition_counts(stats: &Value) -> (u64, u64) {
    let read = |key: &str| stats.get(key).and_then(Value::as_u64).unwrap_or_default();
    (read("num_pindexes_actual"), read("num_pindexes_target"))
}

/// Definition as returned by the service, with the observed replica count
/// filled in: all configured replicas once every partition serves, none
/// before.
pub(crate) fn with_observed_replicas(mut definition: IndexDefinition, partitions: (u64, u64)) -> IndexDefinition {
    let (actual, target) = partitions;
    let serving = target > 0 && actual >= target;
    definition.plan_params.num_replicas_actual = Some(if serving { definition.plan_params.num_replicas } else { 0 });
    definition
}

impl SearchIndexManager for RestIndexManager {
    fn get_index(&self, name: &str) -> BackendResult<IndexDefinition> {
        let response = self
            .session
            .client
            .get(&self.index_url(name))?
            .into_json(|| BackendError::IndexNotFound(name.to_string()))?;
        let definition = response
            .get("indexDef")
            .cloned()
            .ok_or_else(|| BackendError::Unexpected(format!("no indexDef for {name}")))?;
        let definition: IndexDefinition = serde_json::from_value(definition)
            .map_err(|e| BackendError::Unexpected(format!("invalid index definition for {name}: {e}")))?;
        Ok(with_observed_replicas(definition, self.partitions(name)))
    }

    fn drop_index(&self, name: &str) -> BackendResult<()> {
        self.session
            .client
            .send(Method::DELETE, &self.index_url(name), Body::Empty)?
            .into_unit(|| BackendError::IndexNotFound(name.to_string()))
    }

    fn upsert_index(&self, definition: &IndexDefinition) -> BackendResult<()> {
        let mut definition = definition.clone();
        definition.plan_params.num_replicas_actual = None;
        let body = serde_json::to_value(&definition)
            .map_err(|e| BackendError::Unexpected(format!("cannot encode index definition: {e}")))?;
        self.session
            .client
            .send(Method::PUT, &self.index_url(&definition.name), Body::Json(&body))?
            .into_unit(|| BackendError::IndexNotFound(definition.name.clone()))
    }

    fn get_indexed_documents_count(&self, name: &str) -> BackendResult<u64> {
        let response = self
            .session
            .client
            .get(&format!("{}/count", self.index_url(name)))?
            .into_json(|| BackendError::IndexNotFound(name.to_string()))?;
        response
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| BackendError::Unexpected(format!("no count for {name}")))
    }
}
