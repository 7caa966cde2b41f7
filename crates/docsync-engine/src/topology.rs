//! Scope and collection resolution.
//!
//! Resolution enumerates scopes first and only creates what is missing.
//! The check and the create are separate round trips, so a concurrent
//! creator makes the create fail; that failure is returned, not retried.

use std::sync::Arc;
use std::time::Duration;

use docsync_core::error::Result;
use docsync_core::traits::{Bucket, Collection, Scope};
use docsync_core::types::{CollectionHandle, DEFAULT_NAMESPACE};

/// Cached handles to one keyspace.
#[derive(Clone)]
pub struct ResolvedCollection {
    pub handle: CollectionHandle,
    pub scope: Arc<dyn Scope>,
    pub collection: Arc<dyn Collection>,
}

impl ResolvedCollection {
    /// Builds handles without checking that anything exists.
    pub fn resolve(bucket: &dyn Bucket, scope_name: &str, collection_name: &str) -> Self {
        let scope = bucket.scope(scope_name);
        let collection = scope.collection(collection_name);
        Self { handle: CollectionHandle::new(bucket.name(), scope_name, collection_name), scope, collection }
    }
}

/// Makes sure `scope_name.collection_name` exists and returns its handles.
///
/// With `overwrite`, an existing collection is dropped and recreated after
/// waiting `settle` for the drop to propagate. The `_default` scope is never
/// created.
pub fn ensure_scope_and_collection(
    bucket: &dyn Bucket,
    scope_name: &str,
    collection_name: &str,
    overwrite: bool,
    settle: Duration,
) -> Result<ResolvedCollection> {
    let manager = bucket.collections();
    let scopes = manager.get_all_scopes()?;
    let scope = scopes.iter().find(|s| s.name == scope_name);
    let collection_present = scope.is_some_and(|s| s.has_collection(collection_name));

    if collection_present && !overwrite {
        tracing::debug!("collection {scope_name}.{collection_name} already exists");
        return Ok(ResolvedCollection::resolve(bucket, scope_name, collection_name));
    }

    if scope.is_none() && scope_name != DEFAULT_NAMESPACE {
        manager.create_scope(scope_name)?;
        tracing::info!("created scope {scope_name} in bucket {}", bucket.name());
    }

    if collection_present {
        manager.drop_collection(scope_name, collection_name)?;
        tracing::info!("dropped collection {scope_name}.{collection_name} for overwrite");
        std::thread::sleep(settle);
    }

    manager.create_collection(scope_name, collection_name)?;
    tracing::info!("created collection {scope_name}.{collection_name}");
    Ok(ResolvedCollection::resolve(bucket, scope_name, collection_name))
}

/// Whether enumeration lists the collection. Errors read as `false`.
pub fn collection_exists(bucket: &dyn Bucket, scope_name: &str, collection_name: &str) -> bool {
    match bucket.collections().get_all_scopes() {
        Ok(scopes) => scopes.iter().any(|s| s.name == scope_name && s.has_collection(collection_name)),
        Err(e) => {
            tracing::warn!("scope enumeration failed: {e}");
            false
        }
    }
}
