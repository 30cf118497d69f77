//! Full run integration tests.
//!
//! Tests for complete runs through the check manager: record coverage,
//! failure isolation, timeouts, thread start failures and fatal errors.

use crate::mocks::*;
use fabric_preflight::engine::manager::{
    timeout_message, CheckManager, ManagerConfig, EARLY_TERMINATION_MESSAGE, THREAD_START_FAILURE_MESSAGE,
};
use fabric_preflight::engine::registry::{DataSource, RegisteredCheck};
use fabric_preflight::engine::store::ResultStore;
use fabric_preflight::engine::wrapper::not_a_result_message;
use fabric_preflight::{
    run_preflight, CheckInputs, CheckResult, PreflightError, ResultStatus, RuleStatus, RunContext, RunMetadata,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn manager_config(timeout: Duration) -> ManagerConfig {
    ManagerConfig {
        timeout,
        poll_interval: Duration::from_millis(10),
        ..ManagerConfig::default()
    }
}

fn new_manager(
    dir: &tempfile::TempDir,
    timeout: Duration,
    checks: Vec<RegisteredCheck>,
) -> (Arc<ResultStore>, CheckManager) {
    let store = Arc::new(ResultStore::open(dir.path().join("json_results")).unwrap());
    let manager = CheckManager::new(manager_config(timeout), Arc::clone(&store), checks);
    (store, manager)
}

#[test]
fn test_all_checks_pass() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), Duration::from_secs(10));
    let ctx = Arc::new(RunContext::new(dir.path()));
    let checks = vec![passing_check("a"), passing_check("b"), passing_check("c")];

    let report = run_preflight(Arc::clone(&ctx), &config, CheckInputs::default(), checks).unwrap();

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.passed(), 3);
    assert_eq!(report.summary.to_map()["PASS"], 3);
    assert_eq!(report.summary.to_map()["TOTAL"], 3);

    let store = ResultStore::open(ctx.results_dir()).unwrap();
    for id in ["a", "b", "c"] {
        let record = store.load_record(id).unwrap();
        assert_eq!(record.rule_status, RuleStatus::Pass);
        assert_eq!(record.name, format!("Check {}", id));
    }

    let meta: RunMetadata = serde_json::from_slice(&std::fs::read(ctx.metadata_path()).unwrap()).unwrap();
    assert_eq!(meta.total_checks, 3);
    assert_eq!(meta.name, "PreupgradeCheck");
}

#[test]
fn test_every_record_leaves_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    let release = Arc::new(AtomicBool::new(false));
    let checks = vec![
        passing_check("ok"),
        erroring_check("err", "api unreachable"),
        panicking_check("panics"),
        status_check("manual", ResultStatus::ManualReview, "look at this"),
        blocking_check("stuck", Arc::clone(&release)),
    ];
    let (store, mut manager) = new_manager(&dir, Duration::from_millis(300), checks);

    manager.run_checks(CheckInputs::default()).unwrap();
    release.store(true, Ordering::SeqCst);

    for check in manager.checks() {
        let record = store.load_record(&check.id).unwrap();
        assert_ne!(record.rule_status, RuleStatus::InProgress, "{}", check.id);
    }
    assert_eq!(manager.summary().total, 5);
}

#[test]
fn test_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let checks = vec![
        passing_check("before"),
        erroring_check("err", "boom"),
        panicking_check("panics"),
        passing_check("after"),
    ];
    let (_store, mut manager) = new_manager(&dir, Duration::from_secs(10), checks);
    manager.run_checks(CheckInputs::default()).unwrap();

    assert_eq!(manager.get_check_result("before").unwrap().status(), ResultStatus::Pass);
    assert_eq!(manager.get_check_result("after").unwrap().status(), ResultStatus::Pass);

    let err = manager.get_check_result("err").unwrap();
    assert_eq!(err.status(), ResultStatus::Error);
    assert_eq!(err.message(), "Unexpected Error: boom");

    let panicked = manager.get_check_result("panics").unwrap();
    assert_eq!(panicked.status(), ResultStatus::Error);
    assert_eq!(panicked.message(), "Unexpected Error: index out of range");
}

#[test]
fn test_non_result_payload_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let checks = vec![
        RegisteredCheck::raw("scripted", "Scripted", DataSource::Api, |_| Ok(json!("done"))),
        RegisteredCheck::raw("scripted_ok", "Scripted OK", DataSource::Api, |_| {
            Ok(json!({
                "status": "MANUAL CHECK REQUIRED",
                "message": "check manually",
                "headers": ["Node ID"],
                "rows": [[101]]
            }))
        }),
    ];
    let (store, mut manager) = new_manager(&dir, Duration::from_secs(10), checks);
    manager.run_checks(CheckInputs::default()).unwrap();

    let bad = manager.get_check_result("scripted").unwrap();
    assert_eq!(bad.status(), ResultStatus::Error);
    assert_eq!(bad.message(), not_a_result_message("scripted"));
    assert_eq!(bad.message(), "The result of scripted is not a Result object");

    let ok = store.load_record("scripted_ok").unwrap();
    assert_eq!(ok.reason, "check manually");
    assert_eq!(ok.failure_details.data[0]["Node ID"], "101");
}

#[test]
fn test_timeout_finalizes_unfinished_checks() {
    let dir = tempfile::tempdir().unwrap();
    let release = Arc::new(AtomicBool::new(false));
    let timeout = Duration::from_millis(200);
    let checks = vec![passing_check("fast"), blocking_check("slow", Arc::clone(&release))];
    let (store, mut manager) = new_manager(&dir, timeout, checks);

    let started = Instant::now();
    manager.run_checks(CheckInputs::default()).unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_secs(5));

    assert_eq!(manager.get_check_result("fast").unwrap().status(), ResultStatus::Pass);
    let slow = manager.get_check_result("slow").unwrap();
    assert_eq!(slow.status(), ResultStatus::Error);
    assert_eq!(slow.message(), timeout_message(timeout));
    assert_eq!(slow.message(), "Timeout. Unable to finish in time (0.2 sec).");

    // The blocked worker finishes later; its result must not replace the timeout record.
    release.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(200));
    let record = store.load_record("slow").unwrap();
    assert_eq!(record.rule_status, RuleStatus::Fail);
    assert_eq!(record.reason, timeout_message(timeout));
    assert_eq!(store.get_result("slow").unwrap().status(), ResultStatus::Error);
}

#[test]
fn test_timeout_event_is_set_for_workers() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(AtomicBool::new(false));
    let seen_by_check = Arc::clone(&seen);
    let check = RegisteredCheck::new("polls", "Polls", DataSource::Ssh, move |inputs: &CheckInputs| {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !inputs.timeout_event.is_set() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        seen_by_check.store(inputs.timeout_event.is_set(), Ordering::SeqCst);
        Ok(CheckResult::pass())
    });
    let (_store, mut manager) = new_manager(&dir, Duration::from_millis(100), vec![check]);

    manager.run_checks(CheckInputs::default()).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(seen.load(Ordering::SeqCst));
}

#[test]
fn test_thread_start_failure() {
    let dir = tempfile::tempdir().unwrap();
    let checks = vec![passing_check("a"), passing_check("b"), passing_check("c")];
    let (store, manager) = new_manager(&dir, Duration::from_secs(10), checks);
    let mut manager = manager.with_spawner(Box::new(FailingSpawner::for_checks(&["b"])));

    manager.run_checks(CheckInputs::default()).unwrap();

    let skipped = manager.get_check_result("b").unwrap();
    assert_eq!(skipped.status(), ResultStatus::Error);
    assert_eq!(skipped.message(), THREAD_START_FAILURE_MESSAGE);
    assert_eq!(store.load_record("b").unwrap().reason, THREAD_START_FAILURE_MESSAGE);
    assert_eq!(manager.get_check_result("a").unwrap().status(), ResultStatus::Pass);
    assert_eq!(manager.get_check_result("c").unwrap().status(), ResultStatus::Pass);
}

#[test]
fn test_worker_dying_before_reporting() {
    let dir = tempfile::tempdir().unwrap();
    let checks = vec![passing_check("a"), passing_check("lost")];
    let (store, manager) = new_manager(&dir, Duration::from_secs(10), checks);
    let mut manager = manager.with_spawner(Box::new(DyingSpawner::for_check("lost")));

    manager.run_checks(CheckInputs::default()).unwrap();

    let lost = manager.get_check_result("lost").unwrap();
    assert_eq!(lost.status(), ResultStatus::Error);
    assert_eq!(lost.message(), EARLY_TERMINATION_MESSAGE);
    assert_eq!(store.load_record("lost").unwrap().rule_status, RuleStatus::Fail);
}

#[test]
fn test_store_failure_after_check_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("json_results");
    let clobber = RegisteredCheck::new("clobber", "Clobber", DataSource::Api, move |_| {
        clobber_dir(&results);
        Ok(CheckResult::pass())
    });
    let (_store, mut manager) = new_manager(&dir, Duration::from_secs(10), vec![clobber]);

    let err = manager.run_checks(CheckInputs::default()).unwrap_err();
    assert!(matches!(err, PreflightError::Io { .. }), "{:?}", err);
}

#[test]
fn test_store_failure_is_fatal_when_thread_exits_late() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("json_results");
    let clobber = RegisteredCheck::new("clobber", "Clobber", DataSource::Api, move |_| {
        clobber_dir(&results);
        Ok(CheckResult::pass())
    });
    let (_store, manager) = new_manager(&dir, Duration::from_secs(10), vec![clobber]);
    let mut manager = manager.with_spawner(Box::new(LingeringSpawner::new(Duration::from_millis(100))));

    let err = manager.run_checks(CheckInputs::default()).unwrap_err();
    assert!(matches!(err, PreflightError::Io { .. }), "{:?}", err);
    assert!(manager.get_check_result("clobber").is_none());
}

#[test]
fn test_wait_for_claimed_results_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, manager) = new_manager(&dir, Duration::from_millis(50), vec![passing_check("slow_exit")]);
    let mut manager = manager.with_spawner(Box::new(LingeringSpawner::new(Duration::from_secs(3))));

    let started = Instant::now();
    let err = manager.run_checks(CheckInputs::default()).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(
        matches!(err, PreflightError::ResultsPending { ref check_ids } if check_ids == "slow_exit"),
        "{:?}",
        err
    );
}

#[test]
fn test_store_failure_on_timeout_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("json_results");
    let release = Arc::new(AtomicBool::new(false));
    let release_by_check = Arc::clone(&release);
    let clobber = RegisteredCheck::new("clobber", "Clobber", DataSource::Api, move |_| {
        clobber_dir(&results);
        while !release_by_check.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }
        Ok(CheckResult::pass())
    });
    let (_store, mut manager) = new_manager(&dir, Duration::from_millis(200), vec![clobber]);

    let result = manager.run_checks(CheckInputs::default());
    release.store(true, Ordering::SeqCst);
    assert!(matches!(result, Err(PreflightError::Io { .. })));
}

#[test]
fn test_summary_excludes_unfinalized_checks() {
    let dir = tempfile::tempdir().unwrap();
    let checks = vec![passing_check("a"), passing_check("b"), passing_check("c")];
    let (store, mut manager) = new_manager(&dir, Duration::from_secs(10), checks);
    manager.initialize_checks().unwrap();

    store.update_result("a", CheckResult::pass()).unwrap();

    let summary = manager.summary();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.to_map()["TOTAL"], 1);
    assert_eq!(store.load_record("b").unwrap().rule_status, RuleStatus::InProgress);
}

#[test]
fn test_per_check_inputs_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let make = |id: &str| {
        let seen = Arc::clone(&seen);
        RegisteredCheck::new(id, id, DataSource::Api, move |inputs: &CheckInputs| {
            let value = inputs.extra("threshold").cloned().unwrap_or(json!(null));
            seen.lock().unwrap().push(value);
            Ok(CheckResult::pass())
        })
    };
    let checks = vec![make("plain"), make("tuned").with_input("threshold", json!(90))];
    let (_store, mut manager) = new_manager(&dir, Duration::from_secs(10), checks);

    manager.run_checks(CheckInputs::default()).unwrap();

    let mut values = seen.lock().unwrap().clone();
    values.sort_by_key(|v| v.to_string());
    assert_eq!(values, vec![json!(90), json!(null)]);
}

#[test]
fn test_progress_reaches_total() {
    let dir = tempfile::tempdir().unwrap();
    let checks = vec![passing_check("a"), passing_check("b")];
    let (_store, mut manager) = new_manager(&dir, Duration::from_secs(10), checks);
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    manager.set_progress_hook(Box::new(move |done, total| sink.lock().unwrap().push((done, total))));

    manager.run_checks(CheckInputs::default()).unwrap();

    let updates = updates.lock().unwrap();
    assert_eq!(updates.last(), Some(&(2, 2)));
}

#[test]
fn test_unknown_selector_aborts_before_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), Duration::from_secs(10));
    config.debug_function = Some("nope".to_string());
    let ctx = Arc::new(RunContext::new(dir.path()));

    let err = run_preflight(Arc::clone(&ctx), &config, CheckInputs::default(), vec![passing_check("a")]).unwrap_err();
    assert!(matches!(err, PreflightError::UnknownCheck { ref check_id } if check_id == "nope"));
    assert!(!ctx.results_dir().join("a.json").exists());
}
