use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use docsync_core::error::{BackendError, BackendResult};
use docsync_core::traits::{Bucket, Collection, CollectionManager, Scope, SearchIndexManager};
use docsync_core::types::{
    CollectionSpec, DocId, IndexDefinition, MultiGetResult, MultiMutationResult, ScopeSpec, SearchHit, SearchRequest,
    SearchResult, DEFAULT_NAMESPACE,
};

use crate::state::{cosine_sim, embedding_of, matches_filters, IndexEntry, IndexLocation, Op, ScopeState, State};

type Shared = Arc<Mutex<State>>;

pub(crate) fn store_index(state: &mut State, location: IndexLocation, definition: IndexDefinition, actual: u32) {
    state
        .indexes
        .entry(location)
        .or_default()
        .insert(definition.name.clone(), IndexEntry { definition, actual_replicas: actual });
}

pub(crate) fn search(
    state: &mut State,
    location: &IndexLocation,
    index: &str,
    request: &SearchRequest,
) -> BackendResult<SearchResult> {
    state.enter(Op::Search, &location.label(), index)?;
    state.index(location, index)?;

    if let Some(hits) = state.scripted_hits.get(index) {
        return Ok(SearchResult { hits: hits.iter().take(request.limit).cloned().collect() });
    }

    let query = &request.vector_query.vector;
    let mut hits: Vec<SearchHit> = state
        .covered_records(location)
        .into_iter()
        .filter(|(_, record)| matches_filters(record, request.raw.as_ref()))
        .map(|(id, record)| SearchHit { id: id.clone(), score: cosine_sim(query, &embedding_of(record)) })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(request.limit);
    Ok(SearchResult { hits })
}

pub(crate) struct MemoryBucket {
    state: Shared,
    name: String,
}

impl MemoryBucket {
    pub(crate) fn new(state: Shared, name: &str) -> Self {
        Self { state, name: name.to_string() }
    }
}

impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn collections(&self) -> Arc<dyn CollectionManager> {
        Arc::new(MemoryCollectionManager { state: self.state.clone(), bucket: self.name.clone() })
    }

    fn scope(&self, name: &str) -> Arc<dyn Scope> {
        Arc::new(MemoryScope { state: self.state.clone(), bucket: self.name.clone(), name: name.to_string() })
    }
}

struct MemoryCollectionManager {
    state: Shared,
    bucket: String,
}

impl CollectionManager for MemoryCollectionManager {
    fn get_all_scopes(&self) -> BackendResult<Vec<ScopeSpec>> {
        let mut state = self.state.lock();
        state.enter(Op::GetAllScopes, &self.bucket, "")?;
        let bucket = state.bucket(&self.bucket)?;
        Ok(bucket
            .scopes
            .iter()
            .map(|(name, scope)| ScopeSpec {
                name: name.clone(),
                collections: scope.collections.keys().map(|c| CollectionSpec { name: c.clone() }).collect(),
            })
            .collect())
    }

    fn create_scope(&self, scope: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::CreateScope, &self.bucket, scope)?;
        let bucket = state.bucket_mut(&self.bucket)?;
        if bucket.scopes.contains_key(scope) {
            return Err(BackendError::AlreadyExists(format!("scope {scope}")));
        }
        bucket.scopes.insert(scope.to_string(), ScopeState::default());
        Ok(())
    }

    fn create_collection(&self, scope: &str, collection: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::CreateCollection, &format!("{}/{scope}", self.bucket), collection)?;
        let scope_state = state
            .bucket_mut(&self.bucket)?
            .scopes
            .get_mut(scope)
            .ok_or_else(|| BackendError::ScopeNotFound(scope.to_string()))?;
        if scope_state.collections.contains_key(collection) {
            return Err(BackendError::AlreadyExists(format!("collection {collection}")));
        }
        scope_state.collections.insert(collection.to_string(), BTreeMap::new());
        Ok(())
    }

    fn drop_collection(&self, scope: &str, collection: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::DropCollection, &format!("{}/{scope}", self.bucket), collection)?;
        if scope == DEFAULT_NAMESPACE && collection == DEFAULT_NAMESPACE {
            return Err(BackendError::Unexpected("the default collection cannot be dropped".to_string()));
        }
        state
            .bucket_mut(&self.bucket)?
            .scopes
            .get_mut(scope)
            .ok_or_else(|| BackendError::ScopeNotFound(scope.to_string()))?
            .collections
            .remove(collection)
            .map(|_| ())
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))
    }
}

struct MemoryScope {
    state: Shared,
    bucket: String,
    name: String,
}

impl MemoryScope {
    fn location(&self) -> IndexLocation {
        IndexLocation::scope(&self.bucket, &self.name)
    }
}

impl Scope for MemoryScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(MemoryCollection {
            state: self.state.clone(),
            bucket: self.bucket.clone(),
            scope: self.name.clone(),
            name: name.to_string(),
        })
    }

    fn search_indexes(&self) -> Arc<dyn SearchIndexManager> {
        Arc::new(MemoryIndexManager::new(self.state.clone(), self.location()))
    }

    fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResult> {
        search(&mut self.state.lock(), &self.location(), index, request)
    }

    fn find_by_field(&self, collection: &str, field: &str, value: &Value, limit: usize) -> BackendResult<Vec<Value>> {
        let mut state = self.state.lock();
        state.enter(Op::FindByField, &format!("{}/{}/{collection}", self.bucket, self.name), field)?;
        let records = state.collection(&self.bucket, &self.name, collection)?;
        Ok(records.values().filter(|record| record.get(field) == Some(value)).take(limit).cloned().collect())
    }
}

struct MemoryCollection {
    state: Shared,
    bucket: String,
    scope: String,
    name: String,
}

impl MemoryCollection {
    fn location(&self) -> String {
        format!("{}/{}/{}", self.bucket, self.scope, self.name)
    }

    fn mutate(&self, op: Op, docs: &BTreeMap<DocId, Value>, overwrite: bool) -> BackendResult<MultiMutationResult> {
        let mut state = self.state.lock();
        state.enter(op, &self.location(), &docs.len().to_string())?;
        let failing = state.failing_keys.clone();
        let records = state.collection_mut(&self.bucket, &self.scope, &self.name)?;
        let outcomes: Vec<(DocId, BackendResult<()>)> = docs
            .iter()
            .map(|(id, value)| {
                let outcome = if failing.contains(id) {
                    Err(BackendError::Transport(format!("injected failure for key {id}")))
                } else if !overwrite && records.contains_key(id) {
                    Err(BackendError::AlreadyExists(id.clone()))
                } else {
                    records.insert(id.clone(), value.clone());
                    Ok(())
                };
                (id.clone(), outcome)
            })
            .collect();
        Ok(MultiMutationResult::from_outcomes(outcomes))
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, id: &str) -> BackendResult<bool> {
        let mut state = self.state.lock();
        state.enter(Op::Exists, &self.location(), id)?;
        if state.failing_keys.contains(id) {
            return Err(BackendError::Transport(format!("injected failure for key {id}")));
        }
        Ok(state.collection(&self.bucket, &self.scope, &self.name)?.contains_key(id))
    }

    fn insert_multi(&self, docs: &BTreeMap<DocId, Value>) -> BackendResult<MultiMutationResult> {
        self.mutate(Op::InsertMulti, docs, false)
    }

    fn upsert_multi(&self, docs: &BTreeMap<DocId, Value>) -> BackendResult<MultiMutationResult> {
        self.mutate(Op::UpsertMulti, docs, true)
    }

    fn get_multi(&self, ids: &[DocId]) -> BackendResult<MultiGetResult> {
        let mut state = self.state.lock();
        state.enter(Op::GetMulti, &self.location(), &ids.join(","))?;
        let failing = state.failing_keys.clone();
        let records = state.collection(&self.bucket, &self.scope, &self.name)?;
        let results = ids
            .iter()
            .map(|id| {
                let outcome = if failing.contains(id) {
                    Err(BackendError::Transport(format!("injected failure for key {id}")))
                } else {
                    records.get(id).cloned().ok_or_else(|| BackendError::DocumentNotFound(id.clone()))
                };
                (id.clone(), outcome)
            })
            .collect();
        Ok(MultiGetResult::from_results(results))
    }
}

pub(crate) struct MemoryIndexManager {
    state: Shared,
    location: IndexLocation,
}

impl MemoryIndexManager {
    pub(crate) fn new(state: Shared, location: IndexLocation) -> Self {
        Self { state, location }
    }
}

impl SearchIndexManager for MemoryIndexManager {
    fn get_index(&self, name: &str) -> BackendResult<IndexDefinition> {
        let mut state = self.state.lock();
        state.enter(Op::GetIndex, &self.location.label(), name)?;
        let entry = state.index(&self.location, name)?;
        let mut definition = entry.definition.clone();
        definition.plan_params.num_replicas_actual = Some(entry.actual_replicas);
        Ok(definition)
    }

    fn drop_index(&self, name: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::DropIndex, &self.location.label(), name)?;
        state
            .indexes
            .get_mut(&self.location)
            .and_then(|by_name| by_name.remove(name))
            .map(|_| ())
            .ok_or_else(|| BackendError::IndexNotFound(name.to_string()))
    }

    fn upsert_index(&self, definition: &IndexDefinition) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(Op::UpsertIndex, &self.location.label(), &definition.name)?;
        let mut stored = definition.clone();
        stored.plan_params.num_replicas_actual = None;
        let actual = stored.plan_params.num_replicas;
        store_index(&mut state, self.location.clone(), stored, actual);
        Ok(())
    }

    fn get_indexed_documents_count(&self, name: &str) -> BackendResult<u64> {
        let mut state = self.state.lock();
        state.enter(Op::IndexedCount, &self.location.label(), name)?;
        state.index(&self.location, name)?;
        Ok(state.covered_records(&self.location).len() as u64)
    }
}
