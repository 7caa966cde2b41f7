use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use docsync_core::error::{BackendError, Error};
use docsync_core::traits::Cluster;
use docsync_core::types::SearchIndexSpec;
use docsync_engine::index::{ClusterTier, IndexLifecycle, IndexState, ScopeTier, INDEX_READY_TIMEOUT_MESSAGE};
use docsync_memory::{IndexLocation, MemoryCluster, Op};

mod common;
use common::{BUCKET, COLLECTION, INDEX, SCOPE};

const POLL: Duration = Duration::from_millis(10);

fn scope_lifecycle(cluster: &MemoryCluster) -> IndexLifecycle {
    cluster.add_collection(BUCKET, SCOPE, COLLECTION);
    let scope = cluster.bucket(BUCKET).expect("bucket").scope(SCOPE);
    IndexLifecycle::new(Arc::new(ScopeTier::new(scope)), POLL)
}

fn global_lifecycle(cluster: &MemoryCluster) -> IndexLifecycle {
    IndexLifecycle::new(Arc::new(ClusterTier::new(Arc::new(cluster.clone()))), POLL)
}

/// Log sink for asserting on emitted lifecycle transitions.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn logs_of(run: impl FnOnce()) -> String {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, run);
    logs.text()
}

fn position(cluster: &MemoryCluster, op: Op) -> usize {
    cluster.calls().iter().position(|c| c.op == op).expect("call recorded")
}

#[test]
fn overwrite_drops_once_then_upserts_once() {
    for pre_existing in [false, true] {
        let cluster = common::cluster();
        let lifecycle = scope_lifecycle(&cluster);
        if pre_existing {
            cluster.put_index(common::scope_location(), common::definition(), 1);
        }
        cluster.clear_calls();

        lifecycle.create(&common::definition().into(), true, None).expect("create");

        assert_eq!(cluster.calls_to(Op::DropIndex).len(), 1, "pre_existing={pre_existing}");
        assert_eq!(cluster.calls_to(Op::UpsertIndex).len(), 1, "pre_existing={pre_existing}");
        assert!(position(&cluster, Op::DropIndex) < position(&cluster, Op::UpsertIndex));
        assert!(cluster.index(&common::scope_location(), INDEX).is_some());
    }
}

#[test]
fn overwrite_logs_drop_only_when_an_index_was_removed() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    let fresh = logs_of(|| lifecycle.create(&common::definition().into(), true, None).expect("create"));
    assert!(!fresh.contains("Dropping"), "{fresh}");
    assert!(fresh.contains("Absent -> Creating"), "{fresh}");

    let replaced = logs_of(|| lifecycle.create(&common::definition().into(), true, None).expect("create"));
    assert!(replaced.contains("Dropping -> Absent"), "{replaced}");
}

#[test]
fn overwrite_ignores_drop_failures() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.fail(Op::DropIndex, BackendError::Transport("flaky".into()));

    lifecycle.create(&common::definition().into(), true, None).expect("create");
    assert_eq!(cluster.calls_to(Op::UpsertIndex).len(), 1);
}

#[test]
fn overwrite_propagates_upsert_failure() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.fail(Op::UpsertIndex, BackendError::Unexpected("bad definition".into()));

    let err = lifecycle.create(&common::definition().into(), true, None).expect_err("upsert fails");
    assert!(matches!(err, Error::Backend(BackendError::Unexpected(_))));
}

#[test]
fn overwrite_requires_a_definition() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.clear_calls();

    let err = lifecycle.create(&SearchIndexSpec::from(INDEX), true, None).expect_err("name only");
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(cluster.calls().is_empty());
}

#[test]
fn missing_index_by_name_fails() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);

    let err = lifecycle.create(&SearchIndexSpec::from(INDEX), false, None).expect_err("absent");
    assert!(matches!(err, Error::IndexNotFound(ref name) if name == INDEX));
    assert_eq!(err.to_string(), "Index 'test_index' does not exist");
}

#[test]
fn existing_index_is_left_alone() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.put_index(common::scope_location(), common::definition(), 1);
    cluster.clear_calls();

    lifecycle.create(&common::definition().into(), false, None).expect("create");
    lifecycle.create(&SearchIndexSpec::from(INDEX), false, None).expect("create by name");
    assert!(cluster.calls_to(Op::UpsertIndex).is_empty());
    assert!(cluster.calls_to(Op::DropIndex).is_empty());
}

#[test]
fn absent_index_is_created_from_definition() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    assert_eq!(lifecycle.state(INDEX), IndexState::Absent);

    lifecycle.create(&common::definition().into(), false, Some(Duration::from_secs(1))).expect("create");
    assert_eq!(cluster.calls_to(Op::UpsertIndex).len(), 1);
    assert!(cluster.calls_to(Op::DropIndex).is_empty());
    assert_eq!(lifecycle.state(INDEX), IndexState::Ready);
}

#[test]
fn wait_times_out_only_after_the_full_timeout() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.put_index(common::scope_location(), common::definition().with_replicas(2), 1);
    assert_eq!(lifecycle.state(INDEX), IndexState::Creating);

    let timeout = Duration::from_millis(80);
    let started = Instant::now();
    let err = lifecycle.wait_until_ready(INDEX, timeout).expect_err("never ready");
    assert!(started.elapsed() >= timeout);
    assert!(matches!(err, Error::Timeout(ref msg) if msg == INDEX_READY_TIMEOUT_MESSAGE));
    assert!(cluster.calls_to(Op::GetIndex).len() >= 2);
}

#[test]
fn zero_timeout_still_checks_once() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.put_index(common::scope_location(), common::definition(), 1);
    cluster.clear_calls();
    lifecycle.wait_until_ready(INDEX, Duration::ZERO).expect("ready on first check");
    assert_eq!(cluster.calls_to(Op::GetIndex).len(), 1);

    cluster.set_actual_replicas(&common::scope_location(), INDEX, 0);
    cluster.clear_calls();
    let err = lifecycle.wait_until_ready(INDEX, Duration::ZERO).expect_err("not ready");
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(cluster.calls_to(Op::GetIndex).len(), 1);
}

#[test]
fn lookup_errors_count_as_not_ready() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.fail(Op::GetIndex, BackendError::Transport("search service restarting".into()));

    let err = lifecycle.wait_until_ready(INDEX, Duration::from_millis(30)).expect_err("times out");
    assert!(matches!(err, Error::Timeout(_)));
}

#[test]
fn wait_returns_once_replicas_catch_up() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.put_index(common::scope_location(), common::definition(), 0);

    let background = cluster.clone();
    let catch_up = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(40));
        background.set_actual_replicas(&common::scope_location(), INDEX, 1);
    });
    lifecycle.wait_until_ready(INDEX, Duration::from_secs(5)).expect("ready");
    catch_up.join().expect("join");
}

#[test]
fn drop_of_absent_index_is_a_no_op() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    assert!(!lifecycle.drop_index(INDEX).expect("drop"));

    cluster.put_index(common::scope_location(), common::definition(), 1);
    assert!(lifecycle.drop_index(INDEX).expect("drop"));
    assert_eq!(lifecycle.state(INDEX), IndexState::Absent);
}

#[test]
fn global_level_uses_the_cluster_manager_only() {
    let cluster = common::cluster();
    let lifecycle = global_lifecycle(&cluster);

    lifecycle.create(&common::definition().into(), true, None).expect("create");
    assert_eq!(lifecycle.indexed_count(INDEX), 0);

    assert!(cluster.index(&IndexLocation::Global, INDEX).is_some());
    assert!(cluster.index(&common::scope_location(), INDEX).is_none());
    let index_ops = [Op::DropIndex, Op::UpsertIndex, Op::IndexedCount];
    for call in cluster.calls().iter().filter(|c| index_ops.contains(&c.op)) {
        assert_eq!(call.location, "cluster", "{call:?}");
    }
}

#[test]
fn indexed_count_reads_errors_as_zero() {
    let cluster = common::cluster();
    let lifecycle = scope_lifecycle(&cluster);
    cluster.put_index(common::scope_location(), common::definition(), 1);
    common::seed(&cluster, "a", "a", "alpha");
    assert_eq!(lifecycle.indexed_count(INDEX), 1);

    cluster.fail(Op::IndexedCount, BackendError::Transport("down".into()));
    assert_eq!(lifecycle.indexed_count(INDEX), 0);
}
