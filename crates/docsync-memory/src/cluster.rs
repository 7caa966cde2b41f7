use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use docsync_core::error::{BackendError, BackendResult};
use docsync_core::traits::{Bucket, Cluster, Connector, SearchIndexManager};
use docsync_core::types::{ClusterOptions, DocId, IndexDefinition, SearchHit, SearchRequest, SearchResult};

use crate::handles::{self, MemoryBucket, MemoryIndexManager};
use crate::state::{BucketState, Call, IndexLocation, Op, ScopeState, State};

/// Shared handle to an in-memory cluster. Clones see the same state.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    pub(crate) state: Arc<Mutex<State>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cluster holding one bucket with its `_default` scope and collection.
    pub fn with_bucket(bucket: &str) -> Self {
        let cluster = Self::new();
        cluster.add_bucket(bucket);
        cluster
    }

    pub fn add_bucket(&self, bucket: &str) {
        self.state.lock().buckets.entry(bucket.to_string()).or_insert_with(BucketState::with_default_namespace);
    }

    /// Creates the keyspace directly, bypassing call recording.
    pub fn add_collection(&self, bucket: &str, scope: &str, collection: &str) {
        let mut state = self.state.lock();
        state
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(BucketState::with_default_namespace)
            .scopes
            .entry(scope.to_string())
            .or_insert_with(ScopeState::default)
            .collections
            .entry(collection.to_string())
            .or_default();
    }

    pub fn add_scope(&self, bucket: &str, scope: &str) {
        let mut state = self.state.lock();
        state
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(BucketState::with_default_namespace)
            .scopes
            .entry(scope.to_string())
            .or_default();
    }

    pub fn has_scope(&self, bucket: &str, scope: &str) -> bool {
        self.state.lock().buckets.get(bucket).is_some_and(|b| b.scopes.contains_key(scope))
    }

    pub fn has_collection(&self, bucket: &str, scope: &str, collection: &str) -> bool {
        self.state.lock().collection(bucket, scope, collection).is_ok()
    }

    /// Stores an index definition directly, with `actual_replicas` serving.
    pub fn put_index(&self, location: IndexLocation, definition: IndexDefinition, actual_replicas: u32) {
        handles::store_index(&mut self.state.lock(), location, definition, actual_replicas);
    }

    pub fn index(&self, location: &IndexLocation, name: &str) -> Option<IndexDefinition> {
        self.state.lock().index(location, name).ok().map(|entry| entry.definition.clone())
    }

    /// Overrides how many replicas the index reports as serving.
    pub fn set_actual_replicas(&self, location: &IndexLocation, name: &str, actual: u32) {
        if let Some(entry) = self.state.lock().indexes.get_mut(location).and_then(|by_name| by_name.get_mut(name)) {
            entry.actual_replicas = actual;
        }
    }

    /// Every call to `op` fails with `error` until healed.
    pub fn fail(&self, op: Op, error: BackendError) {
        self.state.lock().faults.insert(op, error);
    }

    pub fn heal(&self, op: Op) {
        self.state.lock().faults.remove(&op);
    }

    /// Mutations and reads of `id` fail per key.
    pub fn fail_key(&self, id: &str) {
        self.state.lock().failing_keys.insert(id.to_string());
    }

    /// Makes searches on `index` return exactly `hits`, bypassing scoring.
    pub fn script_hits(&self, index: &str, hits: Vec<SearchHit>) {
        self.state.lock().scripted_hits.insert(index.to_string(), hits);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, op: Op) -> Vec<Call> {
        self.state.lock().calls.iter().filter(|c| c.op == op).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn records(&self, bucket: &str, scope: &str, collection: &str) -> BTreeMap<DocId, Value> {
        self.state.lock().collection(bucket, scope, collection).cloned().unwrap_or_default()
    }

    pub fn put_record(&self, bucket: &str, scope: &str, collection: &str, id: &str, record: Value) {
        if let Ok(records) = self.state.lock().collection_mut(bucket, scope, collection) {
            records.insert(id.to_string(), record);
        }
    }

    /// Removes a record behind the store's back.
    pub fn remove_record(&self, bucket: &str, scope: &str, collection: &str, id: &str) -> Option<Value> {
        self.state.lock().collection_mut(bucket, scope, collection).ok().and_then(|records| records.remove(id))
    }
}

impl Cluster for MemoryCluster {
    fn wait_until_ready(&self, _timeout: Duration) -> BackendResult<()> {
        self.state.lock().enter(Op::WaitUntilReady, "cluster", "")
    }

    fn bucket(&self, name: &str) -> BackendResult<Arc<dyn Bucket>> {
        let mut state = self.state.lock();
        state.enter(Op::Bucket, "cluster", name)?;
        state.bucket(name)?;
        Ok(Arc::new(MemoryBucket::new(self.state.clone(), name)))
    }

    fn search_indexes(&self) -> Arc<dyn SearchIndexManager> {
        Arc::new(MemoryIndexManager::new(self.state.clone(), IndexLocation::Global))
    }

    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult> {
        handles::search(&mut self.state.lock(), &IndexLocation::Global, index, request)
    }
}

/// Hands out the wrapped cluster, or refuses with a fixed error.
pub struct MemoryConnector {
    cluster: MemoryCluster,
    refusal: Option<BackendError>,
}

impl MemoryConnector {
    pub fn new(cluster: MemoryCluster) -> Self {
        Self { cluster, refusal: None }
    }

    pub fn refusing(cluster: MemoryCluster, error: BackendError) -> Self {
        Self { cluster, refusal: Some(error) }
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, connection_string: &str, _options: &ClusterOptions) -> BackendResult<Arc<dyn Cluster>> {
        self.cluster.state.lock().enter(Op::Connect, "cluster", connection_string)?;
        if let Some(err) = &self.refusal {
            return Err(err.clone());
        }
        tracing::debug!("memory cluster connected at {connection_string}");
        Ok(Arc::new(self.cluster.clone()))
    }
}
