use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use docsync_core::error::{BackendError, BackendResult};
use docsync_core::types::{DocId, IndexDefinition, SearchHit, DEFAULT_NAMESPACE, EMBEDDING_FIELD};

/// Port operations, as recorded and as targets for injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    WaitUntilReady,
    Bucket,
    GetAllScopes,
    CreateScope,
    CreateCollection,
    DropCollection,
    Exists,
    InsertMulti,
    UpsertMulti,
    GetMulti,
    FindByField,
    Search,
    GetIndex,
    DropIndex,
    UpsertIndex,
    IndexedCount,
}

/// One recorded port call. `location` says which index manager or keyspace
/// the call went to (`cluster`, `bucket/scope`, `bucket/scope/collection`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub location: String,
    pub target: String,
}

/// Which index manager an index belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexLocation {
    Global,
    Scope { bucket: String, scope: String },
}

impl IndexLocation {
    pub fn scope(bucket: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::Scope { bucket: bucket.into(), scope: scope.into() }
    }

    pub(crate) fn label(&self) -> String {
        match self {
            Self::Global => "cluster".to_string(),
            Self::Scope { bucket, scope } => format!("{bucket}/{scope}"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) definition: IndexDefinition,
    pub(crate) actual_replicas: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    pub(crate) collections: BTreeMap<String, BTreeMap<DocId, Value>>,
}

#[derive(Debug, Default)]
pub(crate) struct BucketState {
    pub(crate) scopes: BTreeMap<String, ScopeState>,
}

impl BucketState {
    pub(crate) fn with_default_namespace() -> Self {
        let mut default_scope = ScopeState::default();
        default_scope.collections.insert(DEFAULT_NAMESPACE.to_string(), BTreeMap::new());
        let mut bucket = Self::default();
        bucket.scopes.insert(DEFAULT_NAMESPACE.to_string(), default_scope);
        bucket
    }
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) buckets: BTreeMap<String, BucketState>,
    pub(crate) indexes: HashMap<IndexLocation, BTreeMap<String, IndexEntry>>,
    pub(crate) faults: HashMap<Op, BackendError>,
    pub(crate) failing_keys: HashSet<DocId>,
    pub(crate) scripted_hits: HashMap<String, Vec<SearchHit>>,
    pub(crate) calls: Vec<Call>,
}

impl State {
    /// Records the call, then fails it if a fault is armed for `op`.
    pub(crate) fn enter(&mut self, op: Op, location: &str, target: &str) -> BackendResult<()> {
        self.calls.push(Call { op, location: location.to_string(), target: target.to_string() });
        match self.faults.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn bucket(&self, bucket: &str) -> BackendResult<&BucketState> {
        self.buckets.get(bucket).ok_or_else(|| BackendError::BucketNotFound(bucket.to_string()))
    }

    pub(crate) fn bucket_mut(&mut self, bucket: &str) -> BackendResult<&mut BucketState> {
        self.buckets.get_mut(bucket).ok_or_else(|| BackendError::BucketNotFound(bucket.to_string()))
    }

    pub(crate) fn collection(&self, bucket: &str, scope: &str, collection: &str) -> BackendResult<&BTreeMap<DocId, Value>> {
        self.bucket(bucket)?
            .scopes
            .get(scope)
            .ok_or_else(|| BackendError::ScopeNotFound(scope.to_string()))?
            .collections
            .get(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))
    }

    pub(crate) fn collection_mut(
        &mut self,
        bucket: &str,
        scope: &str,
        collection: &str,
    ) -> BackendResult<&mut BTreeMap<DocId, Value>> {
        self.bucket_mut(bucket)?
            .scopes
            .get_mut(scope)
            .ok_or_else(|| BackendError::ScopeNotFound(scope.to_string()))?
            .collections
            .get_mut(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))
    }

    pub(crate) fn index(&self, location: &IndexLocation, name: &str) -> BackendResult<&IndexEntry> {
        self.indexes
            .get(location)
            .and_then(|by_name| by_name.get(name))
            .ok_or_else(|| BackendError::IndexNotFound(name.to_string()))
    }

    /// Records an index at `location` covers: the scope's collections for a
    /// scope index, everything for a global one.
    pub(crate) fn covered_records(&self, location: &IndexLocation) -> Vec<(&DocId, &Value)> {
        match location {
            IndexLocation::Global => self
                .buckets
                .values()
                .flat_map(|b| b.scopes.values())
                .flat_map(|s| s.collections.values())
                .flat_map(|c| c.iter())
                .collect(),
            IndexLocation::Scope { bucket, scope } => self
                .buckets
                .get(bucket)
                .and_then(|b| b.scopes.get(scope))
                .map(|s| s.collections.values().flat_map(|c| c.iter()).collect())
                .unwrap_or_default(),
        }
    }
}

pub(crate) fn embedding_of(record: &Value) -> Vec<f32> {
    record
        .get(EMBEDDING_FIELD)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
        .unwrap_or_default()
}

pub(crate) fn cosine_sim(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        f64::from(dot / (mag_a * mag_b))
    }
}

/// Every raw key must match the record's `filters` entry of the same name.
pub(crate) fn matches_filters(record: &Value, raw: Option<&serde_json::Map<String, Value>>) -> bool {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return true;
    };
    let Some(filters) = record.get("filters").and_then(Value::as_object) else {
        return false;
    };
    raw.iter().all(|(k, v)| filters.get(k) == Some(v))
}
