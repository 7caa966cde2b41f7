//! Search index lifecycle: create, overwrite, wait for readiness, drop.
//!
//! An index lives either in the scope that holds the collection or on the
//! cluster. [`SearchTier`] hides which one, so the lifecycle and the query
//! path never branch on the level themselves.

use std::sync::Arc;
use std::time::{Duration, Instant};

use docsync_core::error::{BackendResult, Error, Result};
use docsync_core::traits::{Cluster, Scope, SearchIndexManager};
use docsync_core::types::{IndexLevel, SearchIndexSpec, SearchRequest, SearchResult};

pub const INDEX_READY_TIMEOUT_MESSAGE: &str = "Timeout waiting for FTS index to become ready";

/// Observable states of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Absent,
    /// Defined, but fewer replicas serve than configured.
    Creating,
    Ready,
    Dropping,
}

/// Where search indexes are managed and queried.
pub trait SearchTier: Send + Sync {
    fn level(&self) -> IndexLevel;
    fn indexes(&self) -> Arc<dyn SearchIndexManager>;
    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult>;
}

/// Indexes bound to one scope.
pub struct ScopeTier {
    scope: Arc<dyn Scope>,
}

impl ScopeTier {
    pub fn new(scope: Arc<dyn Scope>) -> Self {
        Self { scope }
    }
}

impl SearchTier for ScopeTier {
    fn level(&self) -> IndexLevel {
        IndexLevel::Collection
    }

    fn indexes(&self) -> Arc<dyn SearchIndexManager> {
        self.scope.search_indexes()
    }

    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult> {
        self.scope.search(index, request)
    }
}

/// Cluster-wide indexes.
pub struct ClusterTier {
    cluster: Arc<dyn Cluster>,
}

impl ClusterTier {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }
}

impl SearchTier for ClusterTier {
    fn level(&self) -> IndexLevel {
        IndexLevel::Global
    }

    fn indexes(&self) -> Arc<dyn SearchIndexManager> {
        self.cluster.search_indexes()
    }

    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult> {
        self.cluster.search(index, request)
    }
}

/// Picks the tier for `level`.
pub fn tier_for(level: IndexLevel, cluster: &Arc<dyn Cluster>, scope: &Arc<dyn Scope>) -> Arc<dyn SearchTier> {
    match level {
        IndexLevel::Collection => Arc::new(ScopeTier::new(scope.clone())),
        IndexLevel::Global => Arc::new(ClusterTier::new(cluster.clone())),
    }
}

pub struct IndexLifecycle {
    tier: Arc<dyn SearchTier>,
    poll_interval: Duration,
}

impl IndexLifecycle {
    pub fn new(tier: Arc<dyn SearchTier>, poll_interval: Duration) -> Self {
        Self { tier, poll_interval }
    }

    pub fn tier(&self) -> &Arc<dyn SearchTier> {
        &self.tier
    }

    pub fn state(&self, name: &str) -> IndexState {
        match self.tier.indexes().get_index(name) {
            Ok(def) if def.plan_params.is_ready() => IndexState::Ready,
            Ok(_) => IndexState::Creating,
            Err(_) => IndexState::Absent,
        }
    }

    /// Brings the index described by `spec` into existence.
    ///
    /// Without `overwrite` an existing index is left as is and a missing one
    /// is created from the definition. With `overwrite` the definition is
    /// required: the index is dropped once (drop errors ignored) and upserted
    /// once. `wait` blocks on readiness after an upsert.
    pub fn create(&self, spec: &SearchIndexSpec, overwrite: bool, wait: Option<Duration>) -> Result<()> {
        let name = spec.name();
        let manager = self.tier.indexes();

        if overwrite {
            let definition = spec.definition().ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Overwriting search index '{name}' requires a full index definition"
                ))
            })?;
            match manager.drop_index(name) {
                Ok(()) => tracing::info!(index = name, level = ?self.tier.level(), "transition {:?} -> {:?}", IndexState::Dropping, IndexState::Absent),
                Err(e) if e.is_not_found() => tracing::debug!("index {name} absent before overwrite"),
                Err(e) => tracing::warn!("dropping index {name} before overwrite failed: {e}"),
            }
            manager.upsert_index(definition)?;
            tracing::info!(index = name, "transition {:?} -> {:?}", IndexState::Absent, IndexState::Creating);
        } else {
            match manager.get_index(name) {
                Ok(_) => {
                    tracing::debug!("index {name} already exists");
                    return Ok(());
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
            let definition = spec.definition().ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
            manager.upsert_index(definition)?;
            tracing::info!(index = name, level = ?self.tier.level(), "transition {:?} -> {:?}", IndexState::Absent, IndexState::Creating);
        }

        if let Some(timeout) = wait {
            self.wait_until_ready(name, timeout)?;
        }
        Ok(())
    }

    /// Polls until the index serves at least as many replicas as configured.
    ///
    /// Checks at least once. Lookup errors count as not ready. Fails with
    /// [`Error::Timeout`] only after `timeout` has fully elapsed.
    pub fn wait_until_ready(&self, name: &str, timeout: Duration) -> Result<()> {
        let manager = self.tier.indexes();
        let start = Instant::now();
        loop {
            match manager.get_index(name) {
                Ok(def) if def.plan_params.is_ready() => {
                    tracing::info!(index = name, "transition {:?} -> {:?}", IndexState::Creating, IndexState::Ready);
                    return Ok(());
                }
                Ok(def) => tracing::debug!(
                    "index {name} not ready: {}/{} replicas",
                    def.plan_params.num_replicas_actual.unwrap_or(0),
                    def.plan_params.num_replicas
                ),
                Err(e) => tracing::debug!("index {name} lookup failed while waiting: {e}"),
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::error!("index {name} not ready after {timeout:?}");
                return Err(Error::Timeout(INDEX_READY_TIMEOUT_MESSAGE.to_string()));
            }
            std::thread::sleep(self.poll_interval.min(timeout - elapsed));
        }
    }

    /// Drops the index. Returns whether there was one.
    pub fn drop_index(&self, name: &str) -> Result<bool> {
        match self.tier.indexes().drop_index(name) {
            Ok(()) => {
                tracing::info!(index = name, "transition {:?} -> {:?}", IndexState::Dropping, IndexState::Absent);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Documents the index reports as indexed. Errors read as 0.
    pub fn indexed_count(&self, name: &str) -> u64 {
        crate::query::get_count(self.tier.as_ref(), name)
    }
}
