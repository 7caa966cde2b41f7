//! Session setup against a cluster.

use std::sync::Arc;
use std::time::Duration;

use docsync_core::error::{Error, Result};
use docsync_core::traits::{Bucket, Cluster, Connector};
use docsync_core::types::ClusterOptions;

/// Opens a session and blocks until the cluster reports ready.
///
/// Both steps fail as [`Error::Connection`] wrapping the backend cause.
pub fn connect(
    connector: &dyn Connector,
    connection_string: &str,
    options: &ClusterOptions,
    ready_timeout: Duration,
) -> Result<Arc<dyn Cluster>> {
    let cluster = connector.connect(connection_string, options).map_err(|e| {
        tracing::error!("connect to {connection_string} failed: {e}");
        Error::connection(e)
    })?;
    cluster.wait_until_ready(ready_timeout).map_err(|e| {
        tracing::error!("cluster at {connection_string} not ready after {ready_timeout:?}: {e}");
        Error::connection(e)
    })?;
    tracing::info!("connected to {connection_string}");
    Ok(cluster)
}

/// Bucket lookup. A missing bucket surfaces as the backend's own error.
pub fn get_bucket(cluster: &dyn Cluster, name: &str) -> Result<Arc<dyn Bucket>> {
    Ok(cluster.bucket(name)?)
}
