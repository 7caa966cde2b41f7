//! Ports the engine depends on.
//!
//! A backend implements the cluster-side traits; the engine never talks to a
//! database client directly. All calls are blocking.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::BackendResult;
use crate::types::{
    ClusterOptions, DocId, IndexDefinition, MultiGetResult, MultiMutationResult, ScopeSpec, SearchRequest,
    SearchResult,
};

/// Turns text into a vector. Opaque to the engine.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Opens sessions against a cluster.
pub trait Connector: Send + Sync {
    fn connect(&self, connection_string: &str, options: &ClusterOptions) -> BackendResult<Arc<dyn Cluster>>;
}

pub trait Cluster: Send + Sync {
    fn wait_until_ready(&self, timeout: Duration) -> BackendResult<()>;
    fn bucket(&self, name: &str) -> BackendResult<Arc<dyn Bucket>>;
    /// Cluster-wide search index manager.
    fn search_indexes(&self) -> Arc<dyn SearchIndexManager>;
    /// Query a cluster-wide index.
    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult>;
}

pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;
    fn collections(&self) -> Arc<dyn CollectionManager>;
    /// Handle to a scope. Does not check that the scope exists.
    fn scope(&self, name: &str) -> Arc<dyn Scope>;
}

pub trait CollectionManager: Send + Sync {
    fn get_all_scopes(&self) -> BackendResult<Vec<ScopeSpec>>;
    fn create_scope(&self, scope: &str) -> BackendResult<()>;
    fn create_collection(&self, scope: &str, collection: &str) -> BackendResult<()>;
    fn drop_collection(&self, scope: &str, collection: &str) -> BackendResult<()>;
}

pub trait Scope: Send + Sync {
    fn name(&self) -> &str;
    /// Handle to a collection. Does not check that the collection exists.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;
    /// Search index manager bound to this scope.
    fn search_indexes(&self) -> Arc<dyn SearchIndexManager>;
    /// Query a scope-level index.
    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult>;
    /// Records of `collection` whose top-level `field` equals `value`, read
    /// with request-plus consistency.
    fn find_by_field(&self, collection: &str, field: &str, value: &Value, limit: usize) -> BackendResult<Vec<Value>>;
}

/// The KV tier.
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;
    fn exists(&self, id: &str) -> BackendResult<bool>;
    /// Fails per key when the key is already present.
    fn insert_multi(&self, docs: &BTreeMap<DocId, Value>) -> BackendResult<MultiMutationResult>;
    fn upsert_multi(&self, docs: &BTreeMap<DocId, Value>) -> BackendResult<MultiMutationResult>;
    fn get_multi(&self, ids: &[DocId]) -> BackendResult<MultiGetResult>;
}

/// The index tier's management surface. Exists once per scope and once per cluster.
pub trait SearchIndexManager: Send + Sync {
    fn get_index(&self, name: &str) -> BackendResult<IndexDefinition>;
    fn drop_index(&self, name: &str) -> BackendResult<()>;
    fn upsert_index(&self, definition: &IndexDefinition) -> BackendResult<()>;
    fn get_indexed_documents_count(&self, name: &str) -> BackendResult<u64>;
}
