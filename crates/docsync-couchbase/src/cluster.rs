use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use docsync_core::error::{BackendError, BackendResult};
use docsync_core::traits::{Bucket, Cluster, CollectionManager, Connector, Scope, SearchIndexManager};
use docsync_core::types::{ClusterOptions, ScopeSpec, SearchRequest, SearchResult};

use crate::endpoints::Endpoints;
use crate::http::{Body, RestClient};
use crate::kv::RestScope;
use crate::search::{IndexScope, RestIndexManager};

const READY_POLL: Duration = Duration::from_millis(500);

/// Session state shared by every handle.
pub(crate) struct Session {
    pub(crate) client: RestClient,
    pub(crate) endpoints: Endpoints,
}

#[derive(Debug, Default)]
pub struct RestConnector;

impl RestConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for RestConnector {
    fn connect(&self, connection_string: &str, options: &ClusterOptions) -> BackendResult<Arc<dyn Cluster>> {
        let endpoints = Endpoints::parse(connection_string)?;
        let client = RestClient::new(options)?;
        tracing::debug!("management endpoint {}", endpoints.management);
        Ok(Arc::new(RestCluster { session: Arc::new(Session { client, endpoints }) }))
    }
}

pub(crate) struct RestCluster {
    session: Arc<Session>,
}

impl Cluster for RestCluster {
    /// Polls the pool endpoint until it answers successfully.
    fn wait_until_ready(&self, timeout: Duration) -> BackendResult<()> {
        let url = self.session.endpoints.pools();
        let start = Instant::now();
        loop {
            let outcome = self
                .session
                .client
                .get(&url)
                .and_then(|reply| reply.into_unit(|| BackendError::Unexpected("no default pool".into())));
            let Err(err) = outcome else {
                return Ok(());
            };
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(BackendError::Transport(format!("cluster not ready after {timeout:?}: {err}")));
            }
            std::thread::sleep(READY_POLL.min(timeout - elapsed));
        }
    }

    fn bucket(&self, name: &str) -> BackendResult<Arc<dyn Bucket>> {
        self.session
            .client
            .get(&self.session.endpoints.bucket(name))?
            .into_unit(|| BackendError::BucketNotFound(name.to_string()))?;
        Ok(Arc::new(RestBucket { session: self.session.clone(), name: name.to_string() }))
    }

    fn search_indexes(&self) -> Arc<dyn SearchIndexManager> {
        Arc::new(RestIndexManager::new(self.session.clone(), IndexScope::Global))
    }

    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult> {
        RestIndexManager::new(self.session.clone(), IndexScope::Global).search(index, request)
    }
}

struct RestBucket {
    session: Arc<Session>,
    name: String,
}

impl Bucket for RestBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn collections(&self) -> Arc<dyn CollectionManager> {
        Arc::new(RestCollectionManager { session: self.session.clone(), bucket: self.name.clone() })
    }

    fn scope(&self, name: &str) -> Arc<dyn Scope> {
        Arc::new(RestScope::new(self.session.clone(), &self.name, name))
    }
}

#[derive(Deserialize)]
struct ScopesManifest {
    scopes: Vec<ScopeSpec>,
}

pub(crate) fn parse_scopes(body: serde_json::Value) -> BackendResult<Vec<ScopeSpec>> {
    serde_json::from_value::<ScopesManifest>(body)
        .map(|manifest| manifest.scopes)
        .map_err(|e| BackendError::Unexpected(format!("invalid scopes manifest: {e}")))
}

struct RestCollectionManager {
    session: Arc<Session>,
    bucket: String,
}

impl CollectionManager for RestCollectionManager {
    fn get_all_scopes(&self) -> BackendResult<Vec<ScopeSpec>> {
        let body = self
            .session
            .client
            .get(&self.session.endpoints.scopes(&self.bucket))?
            .into_json(|| BackendError::BucketNotFound(self.bucket.clone()))?;
        parse_scopes(body)
    }

    fn create_scope(&self, scope: &str) -> BackendResult<()> {
        self.session
            .client
            .send(Method::POST, &self.session.endpoints.scopes(&self.bucket), Body::Form(&[("name", scope)]))?
            .into_unit(|| BackendError::BucketNotFound(self.bucket.clone()))
    }

    fn create_collection(&self, scope: &str, collection: &str) -> BackendResult<()> {
        self.session
            .client
            .send(
                Method::POST,
                &self.session.endpoints.collections(&self.bucket, scope),
                Body::Form(&[("name", collection)]),
            )?
            .into_unit(|| BackendError::ScopeNotFound(scope.to_string()))
    }

    fn drop_collection(&self, scope: &str, collection: &str) -> BackendResult<()> {
        self.session
            .client
            .send(Method::DELETE, &self.session.endpoints.collection(&self.bucket, scope, collection), Body::Empty)?
            .into_unit(|| BackendError::CollectionNotFound(collection.to_string()))
    }
}
