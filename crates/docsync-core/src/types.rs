//! Domain types shared by the engine and the backends.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BackendError, BackendResult};

pub type DocId = String;
pub type Meta = Map<String, Value>;
pub type Filters = Map<String, Value>;

/// Reserved scope/collection name that always exists and cannot be created.
pub const DEFAULT_NAMESPACE: &str = "_default";

/// Field of a stored record that holds the embedding vector.
pub const EMBEDDING_FIELD: &str = "embedding";

/// Replaces NUL bytes, which the KV tier rejects, with U+FFFD.
pub fn clean_content(content: &str) -> String {
    content.replace('\0', "\u{FFFD}")
}

/// Deterministic document id: blake3 hex digest of the cleaned content.
pub fn content_id(content: &str) -> DocId {
    blake3::hash(clean_content(content).as_bytes()).to_hex().to_string()
}

/// A document as the caller sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalDocument {
    pub id: Option<DocId>,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub meta_data: Meta,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl LogicalDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { name: name.into(), content: content.into(), ..Self::default() }
    }

    pub fn from_content(content: impl Into<String>) -> Self {
        Self::new(String::new(), content)
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta_data.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// The id this document is stored under.
    pub fn content_id(&self) -> DocId {
        content_id(&self.content)
    }
}

/// The KV-tier projection of a [`LogicalDocument`].
///
/// `id` is the record key and is not part of the stored JSON value.
/// `filters` is only serialized when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(skip)]
    pub id: DocId,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub meta_data: Meta,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

impl StoredRecord {
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "name": self.name,
            "content": self.content,
            "meta_data": Value::Object(self.meta_data.clone()),
            "embedding": self.embedding,
        });
        if let (Some(filters), Some(obj)) = (&self.filters, value.as_object_mut()) {
            obj.insert("filters".to_string(), Value::Object(filters.clone()));
        }
        value
    }

    pub fn from_value(id: impl Into<DocId>, value: Value) -> serde_json::Result<Self> {
        let mut record: Self = serde_json::from_value(value)?;
        record.id = id.into();
        Ok(record)
    }

    pub fn into_document(self) -> LogicalDocument {
        LogicalDocument {
            id: Some(self.id),
            name: self.name,
            content: self.content,
            meta_data: self.meta_data,
            embedding: Some(self.embedding),
        }
    }
}

/// Planning parameters of a search index.
///
/// `num_replicas` is what the definition asks for; `num_replicas_actual` is
/// what the search service reports as serving.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanParams {
    #[serde(default)]
    pub num_replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_replicas_actual: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanParams {
    pub fn is_ready(&self) -> bool {
        self.num_replicas_actual.unwrap_or(0) >= self.num_replicas
    }
}

/// Definition of a full-text/vector search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: String,
    pub source_type: String,
    pub source_name: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, rename = "sourceUUID")]
    pub source_uuid: String,
    #[serde(default)]
    pub source_params: Map<String, Value>,
    #[serde(default)]
    pub plan_params: PlanParams,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_type: "fulltext-index".to_string(),
            source_type: "gocbcore".to_string(),
            source_name: source_name.into(),
            uuid: String::new(),
            params: Map::new(),
            source_uuid: String::new(),
            source_params: Map::new(),
            plan_params: PlanParams::default(),
        }
    }

    pub fn with_replicas(mut self, num_replicas: u32) -> Self {
        self.plan_params.num_replicas = num_replicas;
        self
    }
}

/// How the store refers to its search index: by name only (it must already
/// exist) or by full definition (the store may create it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchIndexSpec {
    Name(String),
    Definition(IndexDefinition),
}

impl SearchIndexSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Definition(def) => &def.name,
        }
    }

    pub fn definition(&self) -> Option<&IndexDefinition> {
        match self {
            Self::Name(_) => None,
            Self::Definition(def) => Some(def),
        }
    }
}

impl From<&str> for SearchIndexSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<IndexDefinition> for SearchIndexSpec {
    fn from(def: IndexDefinition) -> Self {
        Self::Definition(def)
    }
}

/// Where the search index lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLevel {
    /// Bound to the scope that holds the collection.
    Collection,
    /// Cluster-wide.
    Global,
}

impl IndexLevel {
    pub fn from_global_flag(is_global_level_index: bool) -> Self {
        if is_global_level_index { Self::Global } else { Self::Collection }
    }
}

/// Names of the keyspace a store writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionHandle {
    pub bucket: String,
    pub scope_name: String,
    pub collection_name: String,
}

impl CollectionHandle {
    pub fn new(bucket: impl Into<String>, scope_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), scope_name: scope_name.into(), collection_name: collection_name.into() }
    }
}

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bucket, self.scope_name, self.collection_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
}

/// A scope as reported by scope enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSpec {
    pub name: String,
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,
}

impl ScopeSpec {
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c.name == name)
    }
}

/// A ranked hit from the index tier. Higher score is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorQuery {
    pub field_name: String,
    pub vector: Vec<f32>,
    pub num_candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector_query: VectorQuery,
    pub limit: usize,
    pub fields: Vec<String>,
    /// Passed through verbatim to the search service.
    pub raw: Option<Map<String, Value>>,
}

impl SearchRequest {
    pub fn vector(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector_query: VectorQuery { field_name: EMBEDDING_FIELD.to_string(), vector, num_candidates: limit },
            limit,
            fields: vec!["*".to_string()],
            raw: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
}

impl SearchResult {
    pub fn rows(&self) -> &[SearchHit] {
        &self.hits
    }
}

/// Outcome of a multi-key insert or upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiMutationResult {
    pub all_ok: bool,
    pub exceptions: BTreeMap<DocId, BackendError>,
}

impl MultiMutationResult {
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (DocId, BackendResult<()>)>,
    {
        let exceptions: BTreeMap<DocId, BackendError> = outcomes
            .into_iter()
            .filter_map(|(id, outcome)| outcome.err().map(|e| (id, e)))
            .collect();
        Self { all_ok: exceptions.is_empty(), exceptions }
    }
}

/// Outcome of a multi-key get. Every requested id has an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiGetResult {
    pub all_ok: bool,
    pub results: BTreeMap<DocId, BackendResult<Value>>,
}

impl MultiGetResult {
    pub fn from_results(results: BTreeMap<DocId, BackendResult<Value>>) -> Self {
        let all_ok = results.values().all(Result::is_ok);
        Self { all_ok, results }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub name: String,
    pub reason: String,
}

/// What a batch write did, key by key.
///
/// Batch writes never fail as a whole; callers inspect this report (or query
/// with `id_exists`) to learn which records were persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub stored: Vec<DocId>,
    pub failed: BTreeMap<DocId, String>,
    pub skipped: Vec<SkippedDocument>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Connection options handed to a [`Connector`](crate::traits::Connector).
#[derive(Clone, Default)]
pub struct ClusterOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl ClusterOptions {
    pub fn password_auth(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: Some(username.into()), password: Some(password.into()), request_timeout: None }
    }
}

impl fmt::Debug for ClusterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterOptions")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
