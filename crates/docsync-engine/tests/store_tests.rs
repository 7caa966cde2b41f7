use std::sync::Arc;

use serde_json::{json, Value};

use docsync_core::error::{BackendError, Error};
use docsync_core::traits::Embedder;
use docsync_core::types::{Filters, IndexLevel, LogicalDocument, SearchHit, StoredRecord};
use docsync_engine::DocumentStore;
use docsync_memory::{IndexLocation, MemoryConnector, Op};

mod common;
use common::{doc, BUCKET, COLLECTION, INDEX, SCOPE};

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dim(&self) -> usize {
        2
    }

    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("model unavailable")
    }
}

fn filters(pairs: &[(&str, &str)]) -> Filters {
    pairs.iter().map(|(k, v)| (k.to_string(), Value::String(v.to_string()))).collect()
}

fn hit(id: &str, score: f64) -> SearchHit {
    SearchHit { id: id.to_string(), score }
}

#[test]
fn empty_names_fail_before_any_network_call() {
    for (bucket, scope, collection) in [("", SCOPE, COLLECTION), (BUCKET, "", COLLECTION), (BUCKET, SCOPE, "")] {
        let cluster = common::cluster();
        let mut config = common::config(common::definition());
        config.bucket = bucket.into();
        config.scope = scope.into();
        config.collection = collection.into();

        let err = common::connect_err(&MemoryConnector::new(cluster.clone()), config);
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(cluster.calls().is_empty());
    }

    let mut config = common::config(common::definition());
    config.bucket.clear();
    let err = common::connect_err(&MemoryConnector::new(common::cluster()), config);
    assert_eq!(err.to_string(), "Bucket name must not be empty.");
}

#[test]
fn connect_failure_is_wrapped() {
    let connector = MemoryConnector::refusing(common::cluster(), BackendError::Transport("connection refused".into()));
    let err = common::connect_err(&connector, common::config(common::definition()));
    match err {
        Error::Connection { message, source } => {
            assert!(message.starts_with("Failed to connect to cluster:"), "{message}");
            assert_eq!(source, BackendError::Transport("connection refused".into()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cluster_not_ready_is_a_connection_error() {
    let cluster = common::cluster();
    cluster.fail(Op::WaitUntilReady, BackendError::Transport("timed out".into()));
    let err = common::connect_err(&MemoryConnector::new(cluster), common::config(common::definition()));
    assert!(matches!(err, Error::Connection { .. }));
}

#[test]
fn missing_bucket_propagates_unwrapped() {
    let mut config = common::config(common::definition());
    config.bucket = "no_such_bucket".into();
    let err = common::connect_err(&MemoryConnector::new(common::cluster()), config);
    assert!(matches!(err, Error::Backend(BackendError::BucketNotFound(ref b)) if b == "no_such_bucket"));
}

#[test]
fn connect_resolves_without_creating() {
    let cluster = common::cluster();
    let store = common::open(&cluster, common::config(common::definition()));

    assert_eq!(store.handle().to_string(), "test_bucket.test_scope.test_collection");
    assert_eq!(store.bucket_name(), BUCKET);
    assert_eq!(store.scope_name(), SCOPE);
    assert_eq!(store.collection_name(), COLLECTION);
    assert_eq!(store.search_index_name(), INDEX);
    assert_eq!(store.index_level(), IndexLevel::Collection);
    assert!(!store.exists());
    assert!(cluster.calls_to(Op::CreateScope).is_empty());
    assert!(cluster.calls_to(Op::CreateCollection).is_empty());
}

#[test]
fn insert_then_search_round_trips() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    assert!(store.exists());

    let written = doc("flint", "Starting a fire with flint and steel").with_meta("category", "survival");
    let report = store.insert(std::slice::from_ref(&written), None);
    assert!(report.is_complete());
    assert_eq!(report.attempted, 1);
    assert_eq!(report.stored, vec![written.content_id()]);

    let found = store.search(&written.content, 1, None).expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.as_deref(), Some(written.content_id().as_str()));
    assert_eq!(found[0].name, written.name);
    assert_eq!(found[0].content, written.content);
    assert_eq!(found[0].meta_data, written.meta_data);
    assert!(store.doc_exists(&written));
    assert!(store.name_exists("flint"));
    assert!(!store.name_exists("steel"));
    assert_eq!(store.get_count(), 1);
}

#[test]
fn insert_partial_failure_returns_normally() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    let first = doc("one", "first document");
    let second = doc("two", "second document");
    store.insert(std::slice::from_ref(&first), None);

    let report = store.insert(&[first.clone(), second.clone()], None);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.stored, vec![second.content_id()]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed.contains_key(&first.content_id()));
    assert!(!report.is_complete());
    assert!(store.id_exists(&second.content_id()));
}

#[test]
fn per_key_failures_are_reported() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    let good = doc("good", "kept");
    let bad = doc("bad", "rejected");
    cluster.fail_key(&bad.content_id());

    let report = store.upsert(&[good.clone(), bad.clone()], None);
    assert_eq!(report.stored, vec![good.content_id()]);
    assert!(report.failed.contains_key(&bad.content_id()));
}

#[test]
fn whole_batch_failure_returns_normally() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    cluster.fail(Op::InsertMulti, BackendError::Transport("kv down".into()));

    let docs = [doc("a", "alpha"), doc("b", "bravo")];
    let report = store.insert(&docs, None);
    assert_eq!(report.attempted, 2);
    assert!(report.stored.is_empty());
    assert_eq!(report.failed.len(), 2);
}

#[test]
fn unpreparable_documents_are_skipped() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);

    let report = store.insert(&[doc("empty", ""), doc("full", "has content")], None);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.stored.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].name, "empty");
}

#[test]
fn duplicate_content_collapses_to_one_key() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);

    let report = store.insert(&[doc("a", "same words"), doc("b", "same words")], None);
    assert_eq!(report.attempted, 1);
    assert_eq!(cluster.records(BUCKET, SCOPE, COLLECTION).len(), 1);
}

#[test]
fn upsert_overwrites_existing_records() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    store.upsert(&[doc("v", "versioned").with_meta("version", 1)], None);

    let report = store.upsert(&[doc("v", "versioned").with_meta("version", 2)], None);
    assert!(report.is_complete());
    let id = LogicalDocument::from_content("versioned").content_id();
    let records = cluster.records(BUCKET, SCOPE, COLLECTION);
    assert_eq!(records[&id]["meta_data"]["version"], json!(2));
}

#[test]
fn filters_are_stored_only_when_given() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    let plain = doc("plain", "no filters here");
    let tagged = doc("tagged", "with filters");
    store.insert(std::slice::from_ref(&plain), None);
    store.insert(std::slice::from_ref(&tagged), Some(&filters(&[("category", "test")])));

    let records = cluster.records(BUCKET, SCOPE, COLLECTION);
    assert!(records[&plain.content_id()].get("filters").is_none());
    assert_eq!(records[&tagged.content_id()]["filters"], json!({"category": "test"}));
}

#[test]
fn search_filters_narrow_hits() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    store.insert(&[doc("a", "cabin in the woods")], Some(&filters(&[("category", "shelter")])));
    store.insert(&[doc("b", "cabin fever remedies")], Some(&filters(&[("category", "health")])));

    let found = store.search("cabin", 5, Some(&filters(&[("category", "health")]))).expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "b");
}

#[test]
fn search_keeps_hit_order() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    common::seed(&cluster, "a", "a", "alpha");
    common::seed(&cluster, "b", "b", "bravo");
    cluster.script_hits(INDEX, vec![hit("b", 0.9), hit("a", 0.5)]);

    let found = store.search("anything", 5, None).expect("search");
    let ids: Vec<_> = found.iter().filter_map(|d| d.id.as_deref()).collect();
    assert_eq!(ids, ["b", "a"]);
    assert_eq!(cluster.calls_to(Op::GetMulti).len(), 1);
}

#[test]
fn search_drops_hits_without_records() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    common::seed(&cluster, "a", "a", "alpha");
    cluster.script_hits(INDEX, vec![hit("a", 0.9), hit("missing", 0.8)]);

    let found = store.search("anything", 5, None).expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id.as_deref(), Some("a"));
}

#[test]
fn search_with_no_hits_skips_the_fetch() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    cluster.script_hits(INDEX, Vec::new());

    assert!(store.search("anything", 5, None).expect("search").is_empty());
    assert!(cluster.calls_to(Op::GetMulti).is_empty());
}

#[test]
fn search_embedding_failure_yields_nothing() {
    let cluster = common::cluster();
    let mut store = common::open_with(&cluster, common::config(common::definition()), Arc::new(FailingEmbedder));
    store.create().expect("create");
    let report = store.insert(&[doc("pre", "precomputed").with_embedding(vec![1.0, 0.0])], None);
    assert!(report.is_complete());

    assert!(store.search("precomputed", 5, None).expect("search").is_empty());
    assert!(cluster.calls_to(Op::Search).is_empty());

    let report = store.insert(&[doc("raw", "needs an embedding")], None);
    assert_eq!(report.skipped.len(), 1);
}

#[test]
fn search_and_fetch_errors_propagate() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    common::seed(&cluster, "a", "a", "alpha");
    cluster.script_hits(INDEX, vec![hit("a", 0.9)]);

    cluster.fail(Op::GetMulti, BackendError::Transport("kv down".into()));
    let err = store.search("x", 5, None).expect_err("fetch fails");
    assert!(matches!(err, Error::Backend(BackendError::Transport(_))));

    cluster.fail(Op::Search, BackendError::IndexNotFound(INDEX.into()));
    let err = store.search("x", 5, None).expect_err("search fails");
    assert!(matches!(err, Error::Backend(BackendError::IndexNotFound(_))));
}

#[test]
fn existence_checks_fail_open() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    let document = doc("lookup", "lookup content");
    store.insert(std::slice::from_ref(&document), None);

    cluster.fail(Op::Exists, BackendError::Transport("down".into()));
    cluster.fail(Op::FindByField, BackendError::Transport("down".into()));
    cluster.fail(Op::IndexedCount, BackendError::Transport("down".into()));
    cluster.fail(Op::GetAllScopes, BackendError::Transport("down".into()));
    assert!(!store.doc_exists(&document));
    assert!(!store.id_exists(&document.content_id()));
    assert!(!store.name_exists("missing"));
    assert_eq!(store.get_count(), 0);
    assert!(!store.exists());
}

#[test]
fn prepare_doc_matches_stored_record() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    let document = doc("p", "prepared");
    let prepared = store.prepare_doc(&document, None).expect("prepare");
    store.insert(std::slice::from_ref(&document), None);

    let stored = cluster.records(BUCKET, SCOPE, COLLECTION)[&prepared.id].clone();
    let record = StoredRecord::from_value(prepared.id.clone(), stored).expect("decode");
    assert_eq!(record, prepared);
}

#[test]
fn create_overwrite_replaces_collection_and_index() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    store.insert(&[doc("old", "old content")], None);
    cluster.clear_calls();

    let mut config = common::config(common::definition());
    config.overwrite = true;
    config.wait_until_index_ready = Some(1.0);
    let mut fresh = common::open(&cluster, config);
    fresh.create().expect("overwrite");

    assert_eq!(cluster.calls_to(Op::DropCollection).len(), 1);
    assert_eq!(cluster.calls_to(Op::CreateCollection).len(), 1);
    assert_eq!(cluster.calls_to(Op::DropIndex).len(), 1);
    assert_eq!(cluster.calls_to(Op::UpsertIndex).len(), 1);
    assert!(cluster.records(BUCKET, SCOPE, COLLECTION).is_empty());
    assert_eq!(fresh.get_count(), 0);
}

#[test]
fn overwrite_by_name_fails_before_touching_the_collection() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    store.insert(&[doc("kept", "kept content")], None);
    cluster.clear_calls();

    let mut config = common::config(INDEX);
    config.overwrite = true;
    let err = common::connect_err(&MemoryConnector::new(cluster.clone()), config);

    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    assert!(cluster.calls_to(Op::DropCollection).is_empty());
    assert!(cluster.calls_to(Op::DropIndex).is_empty());
    assert_eq!(cluster.records(BUCKET, SCOPE, COLLECTION).len(), 1);
}

#[test]
fn create_by_name_requires_existing_index() {
    let cluster = common::cluster();
    let mut store = common::open(&cluster, common::config(INDEX));
    let err = store.create().expect_err("missing index");
    assert!(matches!(err, Error::IndexNotFound(_)));
    assert!(store.exists(), "collection is created before the index check");
}

#[test]
fn drop_removes_collection_and_bound_index() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    store.insert(&[doc("d", "doomed")], None);

    store.drop().expect("drop");
    assert!(!store.exists());
    assert!(cluster.index(&common::scope_location(), INDEX).is_none());

    store.drop().expect("second drop is a no-op");
    assert!(!store.delete().expect("delete"));
}

#[test]
fn delete_reports_removal() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    assert!(store.delete().expect("delete"));
    assert!(!store.exists());
}

#[test]
fn drop_leaves_global_index_in_place() {
    let cluster = common::cluster();
    let mut config = common::config(common::definition());
    config.is_global_level_index = true;
    let mut store = common::open(&cluster, config);
    store.create().expect("create");
    assert_eq!(store.index_level(), IndexLevel::Global);
    assert!(cluster.index(&IndexLocation::Global, INDEX).is_some());

    store.drop().expect("drop");
    assert!(!store.exists());
    assert!(cluster.index(&IndexLocation::Global, INDEX).is_some());
}

#[test]
fn global_search_spans_collections() {
    let cluster = common::cluster();
    let mut config = common::config(common::definition());
    config.is_global_level_index = true;
    let mut store = common::open(&cluster, config);
    store.create().expect("create");
    store.insert(&[doc("g", "global reach")], None);

    let found = store.search("global reach", 1, None).expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(store.get_count(), 1);
    assert!(cluster.calls_to(Op::Search).iter().all(|c| c.location == "cluster"));
}

#[test]
fn drop_collection_failure_propagates() {
    let cluster = common::cluster();
    let store = common::created_store(&cluster);
    cluster.fail(Op::DropCollection, BackendError::Transport("busy".into()));

    let err = store.drop().expect_err("drop fails");
    assert!(matches!(err, Error::Backend(BackendError::Transport(_))));
    assert!(store.exists());
}

#[test]
fn connect_waits_for_cluster_readiness() {
    let cluster = common::cluster();
    let store = DocumentStore::connect(
        &MemoryConnector::new(cluster.clone()),
        common::config(common::definition()),
        common::embedder(),
    );
    assert!(store.is_ok());
    assert_eq!(cluster.calls_to(Op::Connect).len(), 1);
    assert_eq!(cluster.calls_to(Op::WaitUntilReady).len(), 1);
}
