//! `DocumentStore`: one logical document store over a KV collection and its
//! search index.

use std::sync::Arc;

use docsync_core::config::StoreConfig;
use docsync_core::error::Result;
use docsync_core::traits::{Bucket, Cluster, Connector, Embedder};
use docsync_core::types::{BatchReport, CollectionHandle, Filters, IndexLevel, LogicalDocument, StoredRecord};

use crate::connection;
use crate::index::{tier_for, IndexLifecycle, IndexState};
use crate::query;
use crate::sync::{self, WriteMode};
use crate::topology::{self, ResolvedCollection};

pub struct DocumentStore {
    config: StoreConfig,
    cluster: Arc<dyn Cluster>,
    bucket: Arc<dyn Bucket>,
    resolved: ResolvedCollection,
    lifecycle: IndexLifecycle,
    embedder: Arc<dyn Embedder>,
}

impl DocumentStore {
    /// Validates `config`, connects and resolves handles. Creates nothing.
    pub fn connect(connector: &dyn Connector, config: StoreConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let cluster = connection::connect(
            connector,
            &config.connection_string,
            &config.cluster_options(),
            config.connect_timeout(),
        )?;
        let bucket = connection::get_bucket(cluster.as_ref(), &config.bucket)?;
        let resolved = ResolvedCollection::resolve(bucket.as_ref(), &config.scope, &config.collection);
        let lifecycle = IndexLifecycle::new(
            tier_for(config.index_level(), &cluster, &resolved.scope),
            config.index_poll_interval(),
        );
        Ok(Self { config, cluster, bucket, resolved, lifecycle, embedder })
    }

    /// Ensures scope, collection and search index exist, honoring `overwrite`.
    pub fn create(&mut self) -> Result<()> {
        let resolved = topology::ensure_scope_and_collection(
            self.bucket.as_ref(),
            &self.config.scope,
            &self.config.collection,
            self.config.overwrite,
            self.config.collection_drop_settle(),
        )?;
        self.lifecycle = IndexLifecycle::new(
            tier_for(self.config.index_level(), &self.cluster, &resolved.scope),
            self.config.index_poll_interval(),
        );
        self.resolved = resolved;
        self.lifecycle.create(&self.config.search_index, self.config.overwrite, self.config.index_ready_timeout())
    }

    pub fn insert(&self, documents: &[LogicalDocument], filters: Option<&Filters>) -> BatchReport {
        self.write(WriteMode::Insert, documents, filters)
    }

    pub fn upsert(&self, documents: &[LogicalDocument], filters: Option<&Filters>) -> BatchReport {
        self.write(WriteMode::Upsert, documents, filters)
    }

    fn write(&self, mode: WriteMode, documents: &[LogicalDocument], filters: Option<&Filters>) -> BatchReport {
        sync::write_batch(mode, self.resolved.collection.as_ref(), self.embedder.as_ref(), documents, filters)
    }

    pub fn search(&self, query: &str, limit: usize, filters: Option<&Filters>) -> Result<Vec<LogicalDocument>> {
        query::search(
            self.lifecycle.tier().as_ref(),
            self.search_index_name(),
            self.resolved.collection.as_ref(),
            self.embedder.as_ref(),
            query,
            limit,
            filters,
        )
    }

    pub fn prepare_doc(&self, document: &LogicalDocument, filters: Option<&Filters>) -> Result<StoredRecord> {
        sync::prepare(document, self.embedder.as_ref(), filters)
    }

    pub fn doc_exists(&self, document: &LogicalDocument) -> bool {
        sync::doc_exists(self.resolved.collection.as_ref(), document)
    }

    pub fn id_exists(&self, id: &str) -> bool {
        sync::id_exists(self.resolved.collection.as_ref(), id)
    }

    /// Looks up by `name` field. On Couchbase this is a N1QL query and needs a
    /// primary or secondary index on the collection; without one it reads `false`.
    pub fn name_exists(&self, name: &str) -> bool {
        sync::name_exists(self.resolved.scope.as_ref(), &self.config.collection, name)
    }

    /// Whether the collection exists.
    pub fn exists(&self) -> bool {
        topology::collection_exists(self.bucket.as_ref(), &self.config.scope, &self.config.collection)
    }

    /// Drops the collection, then a collection-level index bound to it.
    /// A global index is shared and stays. Absent targets are skipped.
    pub fn drop(&self) -> Result<()> {
        self.delete().map(|_| ())
    }

    /// Like [`drop`](Self::drop), reporting whether anything was removed.
    pub fn delete(&self) -> Result<bool> {
        let mut removed = false;
        if self.exists() {
            self.bucket
                .collections()
                .drop_collection(&self.config.scope, &self.config.collection)
                .map_err(|e| {
                    tracing::error!("error dropping collection '{}': {e}", self.config.collection);
                    e
                })?;
            tracing::info!("collection '{}' dropped", self.resolved.handle);
            removed = true;
        }
        if self.index_level() == IndexLevel::Collection {
            removed |= self.lifecycle.drop_index(self.search_index_name())?;
        }
        Ok(removed)
    }

    pub fn get_count(&self) -> u64 {
        self.lifecycle.indexed_count(self.search_index_name())
    }

    /// Blocks until the search index is ready or `timeout` elapses.
    pub fn wait_until_index_ready(&self, timeout: std::time::Duration) -> Result<()> {
        self.lifecycle.wait_until_ready(self.search_index_name(), timeout)
    }

    pub fn index_state(&self) -> IndexState {
        self.lifecycle.state(self.search_index_name())
    }

    pub fn bucket_name(&self) -> &str {
        &self.config.bucket
    }

    pub fn scope_name(&self) -> &str {
        &self.config.scope
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection
    }

    pub fn search_index_name(&self) -> &str {
        self.config.search_index.name()
    }

    pub fn handle(&self) -> &CollectionHandle {
        &self.resolved.handle
    }

    pub fn index_level(&self) -> IndexLevel {
        self.config.index_level()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}
