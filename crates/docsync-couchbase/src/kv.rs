//! KV tier through the query service.

use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use docsync_core::error::{BackendError, BackendResult};
use docsync_core::traits::{Collection, Scope, SearchIndexManager};
use docsync_core::types::{DocId, MultiGetResult, MultiMutationResult, SearchRequest, SearchResult};

use crate::cluster::Session;
use crate::http::Body;
use crate::search::{IndexScope, RestIndexManager};

/// Quotes an identifier for N1QL.
pub(crate) fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub(crate) fn keyspace(bucket: &str, scope: &str, collection: &str) -> String {
    format!("{}.{}.{}", ident(bucket), ident(scope), ident(collection))
}

pub(crate) fn statement_body(statement: &str, args: Vec<Value>, request_plus: bool) -> Value {
    let mut body = json!({ "statement": statement, "args": args });
    if request_plus {
        body["scan_consistency"] = json!("request_plus");
    }
    body
}

/// Maps a query-service error onto a backend error class.
pub(crate) fn query_error(code: i64, message: &str) -> BackendError {
    match code {
        12003 | 12021 => BackendError::CollectionNotFound(message.to_string()),
        12009 | 17012 => BackendError::AlreadyExists(message.to_string()),
        _ => BackendError::Unexpected(format!("query error {code}: {message}")),
    }
}

/// Rows of a query response, or its first error.
pub(crate) fn query_rows(response: &Value) -> BackendResult<Vec<Value>> {
    if let Some(first) = response.get("errors").and_then(Value::as_array).and_then(|errors| errors.first()) {
        let code = first.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = first.get("msg").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(query_error(code, message));
    }
    Ok(response.get("results").and_then(Value::as_array).cloned().unwrap_or_default())
}

fn run_query(session: &Session, statement: &str, args: Vec<Value>, request_plus: bool) -> BackendResult<Vec<Value>> {
    let body = statement_body(statement, args, request_plus);
    let reply = session.client.send(Method::POST, &session.endpoints.query_service(), Body::Json(&body))?;
    let response = reply.json()?;
    query_rows(&response)
}

pub(crate) struct RestScope {
    session: Arc<Session>,
    bucket: String,
    name: String,
}

impl RestScope {
    pub(crate) fn new(session: Arc<Session>, bucket: &str, name: &str) -> Self {
        Self { session, bucket: bucket.to_string(), name: name.to_string() }
    }

    fn indexes(&self) -> RestIndexManager {
        RestIndexManager::new(
            self.session.clone(),
            IndexScope::Scope { bucket: self.bucket.clone(), scope: self.name.clone() },
        )
    }
}

impl Scope for RestScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(RestCollection {
            session: self.session.clone(),
            keyspace: keyspace(&self.bucket, &self.name, name),
            name: name.to_string(),
        })
    }

    fn search_indexes(&self) -> Arc<dyn SearchIndexManager> {
        Arc::new(self.indexes())
    }

    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult> {
        self.indexes().search(index, request)
    }

    fn find_by_field(&self, collection: &str, field: &str, value: &Value, limit: usize) -> BackendResult<Vec<Value>> {
        let statement = format!(
            "SELECT RAW d FROM {} AS d WHERE d.{} = $1 LIMIT {limit}",
            keyspace(&self.bucket, &self.name, collection),
            ident(field)
        );
        run_query(&self.session, &statement, vec![value.clone()], true)
    }
}

struct RestCollection {
    session: Arc<Session>,
    keyspace: String,
    name: String,
}

impl RestCollection {
    /// One statement per key. Keyspace failures abort the whole call.
    fn mutate(&self, verb: &str, docs: &BTreeMap<DocId, Value>) -> BackendResult<MultiMutationResult> {
        let statement = format!("{verb} INTO {} (KEY, VALUE) VALUES ($1, $2)", self.keyspace);
        let mut outcomes = Vec::with_capacity(docs.len());
        for (id, value) in docs {
            let outcome = run_query(&self.session, &statement, vec![json!(id), value.clone()], false).map(|_| ());
            if let Err(e @ BackendError::CollectionNotFound(_)) = outcome {
                return Err(e);
            }
            outcomes.push((id.clone(), outcome));
        }
        Ok(MultiMutationResult::from_outcomes(outcomes))
    }
}

impl Collection for RestCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, id: &str) -> BackendResult<bool> {
        let statement = format!("SELECT RAW META().id FROM {} USE KEYS $1", self.keyspace);
        Ok(!run_query(&self.session, &statement, vec![json!(id)], false)?.is_empty())
    }

    fn insert_multi(&self, docs: &BTreeMap<DocId, Value>) -> BackendResult<MultiMutationResult> {
        self.mutate("INSERT", docs)
    }

    fn upsert_multi(&self, docs: &BTreeMap<DocId, Value>) -> BackendResult<MultiMutationResult> {
        self.mutate("UPSERT", docs)
    }

    fn get_multi(&self, ids: &[DocId]) -> BackendResult<MultiGetResult> {
        let statement = format!("SELECT META(d).id AS id, d AS doc FROM {} AS d USE KEYS $1", self.keyspace);
        let rows = run_query(&self.session, &statement, vec![json!(ids)], false)?;
        Ok(MultiGetResult::from_results(collect_fetched(ids, rows)))
    }
}

/// Pairs requested ids with fetched rows; ids without a row are not found.
pub(crate) fn collect_fetched(ids: &[DocId], rows: Vec<Value>) -> BTreeMap<DocId, BackendResult<Value>> {
    let mut found: BTreeMap<DocId, Value> = rows
        .into_iter()
        .filter_map(|mut row| {
            let id = row.get("id")?.as_str()?.to_string();
            Some((id, row.get_mut("doc")?.take()))
        })
        .collect();
    ids.iter()
        .map(|id| {
            let outcome = found.remove(id).ok_or_else(|| BackendError::DocumentNotFound(id.clone()));
            (id.clone(), outcome)
        })
        .collect()
}
