#![allow(dead_code)]

use std::sync::Arc;

use docsync_core::config::StoreConfig;
use docsync_core::error::Error;
use docsync_core::traits::Embedder;
use docsync_core::types::{IndexDefinition, LogicalDocument, SearchIndexSpec, StoredRecord};
use docsync_embed::HashEmbedder;
use docsync_engine::DocumentStore;
use docsync_memory::{IndexLocation, MemoryCluster, MemoryConnector};

pub const BUCKET: &str = "test_bucket";
pub const SCOPE: &str = "test_scope";
pub const COLLECTION: &str = "test_collection";
pub const INDEX: &str = "test_index";

pub fn cluster() -> MemoryCluster {
    MemoryCluster::with_bucket(BUCKET)
}

pub fn definition() -> IndexDefinition {
    IndexDefinition::new(INDEX, BUCKET).with_replicas(1)
}

pub fn scope_location() -> IndexLocation {
    IndexLocation::scope(BUCKET, SCOPE)
}

pub fn config(search_index: impl Into<SearchIndexSpec>) -> StoreConfig {
    let mut config = StoreConfig::new(BUCKET, SCOPE, COLLECTION, search_index);
    config.collection_drop_settle_ms = 0;
    config.index_poll_interval_ms = 10;
    config
}

pub fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(64))
}

pub fn open_with(cluster: &MemoryCluster, config: StoreConfig, embedder: Arc<dyn Embedder>) -> DocumentStore {
    match DocumentStore::connect(&MemoryConnector::new(cluster.clone()), config, embedder) {
        Ok(store) => store,
        Err(e) => panic!("connect: {e}"),
    }
}

pub fn open(cluster: &MemoryCluster, config: StoreConfig) -> DocumentStore {
    open_with(cluster, config, embedder())
}

/// A created collection-level store with a ready index.
pub fn created_store(cluster: &MemoryCluster) -> DocumentStore {
    let mut store = open(cluster, config(definition()));
    store.create().expect("create");
    store
}

pub fn connect_err(connector: &MemoryConnector, config: StoreConfig) -> Error {
    match DocumentStore::connect(connector, config, embedder()) {
        Ok(_) => panic!("expected connect to fail"),
        Err(e) => e,
    }
}

/// Writes a record straight into the test collection, bypassing the store.
pub fn seed(cluster: &MemoryCluster, id: &str, name: &str, content: &str) {
    let record = StoredRecord {
        id: id.to_string(),
        name: name.to_string(),
        content: content.to_string(),
        meta_data: Default::default(),
        embedding: vec![1.0, 0.0],
        filters: None,
    };
    cluster.put_record(BUCKET, SCOPE, COLLECTION, id, record.to_value());
}

pub fn doc(name: &str, content: &str) -> LogicalDocument {
    LogicalDocument::new(name, content)
}
