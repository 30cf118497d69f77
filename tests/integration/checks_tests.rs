//! Built-in check integration tests.
//!
//! Runs the shipped checks end to end against a mock fabric.

use crate::mocks::*;
use fabric_preflight::checks::switch::NO_SESSIONS_MESSAGE;
use fabric_preflight::checks::{builtin_checks, collect_common_data};
use fabric_preflight::engine::registry::DataSource;
use fabric_preflight::platform::PlatformError;
use fabric_preflight::{run_preflight, Credentials, PreflightError, ResultStatus, RunContext};
use std::sync::Arc;
use std::time::Duration;

fn status_of(report: &fabric_preflight::engine::report::PreflightReport, id: &str) -> ResultStatus {
    report
        .entries
        .iter()
        .find(|e| e.id == id)
        .and_then(|e| e.result.as_ref())
        .map(|r| r.status())
        .unwrap_or_else(|| panic!("no result for {}", id))
}

#[test]
fn test_collect_common_data_from_fabric() {
    let api = Arc::new(MockApi::healthy());
    let inputs = collect_common_data(api.clone(), None, Some("6.0(2h)"), Credentials::default()).unwrap();

    assert_eq!(inputs.cversion.as_ref().map(ToString::to_string).as_deref(), Some("5.2(7f)"));
    assert_eq!(inputs.tversion.as_ref().map(ToString::to_string).as_deref(), Some("6.0(2h)"));
    assert!(inputs.sw_cversion.as_ref().unwrap().same_as("5.2(7f)"));
    assert!(inputs.snapshot("fabricNode").is_some());
    assert!(inputs.snapshot("firmwareRunning").is_some());
    assert_eq!(api.calls(), vec!["firmwareCtrlrRunning", "firmwareRunning", "fabricNode"]);
}

#[test]
fn test_command_line_version_wins() {
    let api = Arc::new(MockApi::healthy());
    let inputs = collect_common_data(api.clone(), Some("5.2(8i)"), None, Credentials::default()).unwrap();
    assert!(inputs.cversion.unwrap().same_as("5.2(8i)"));
    assert!(!api.calls().contains(&"firmwareCtrlrRunning".to_string()));
}

#[test]
fn test_collect_common_data_failures_are_setup_errors() {
    let api = Arc::new(MockApi::healthy().with_failure(
        "fabricNode",
        PlatformError::Api {
            code: "403".to_string(),
            text: "Forbidden".to_string(),
        },
    ));
    let err = collect_common_data(api, None, None, Credentials::default()).unwrap_err();
    assert!(matches!(err, PreflightError::Setup { ref context, .. } if context == "fabricNode"));

    let err = collect_common_data(Arc::new(MockApi::healthy()), None, Some("latest"), Credentials::default())
        .unwrap_err();
    assert!(matches!(err, PreflightError::Setup { .. }));
}

#[test]
fn test_healthy_fabric_run() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockApi::healthy());
    let mut inputs = collect_common_data(api, None, Some("6.0(2h)"), Credentials::default()).unwrap();
    inputs.sessions = Some(Arc::new(MockSessions::default()));

    let config = test_config(dir.path(), Duration::from_secs(30));
    let ctx = Arc::new(RunContext::new(dir.path()));
    let report = run_preflight(ctx, &config, inputs, builtin_checks()).unwrap();

    assert_eq!(report.summary.total, builtin_checks().len());
    assert_eq!(report.summary.failed(), 0, "{:#?}", report.entries);
}

#[test]
fn test_degraded_fabric_run() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(
        MockApi::healthy()
            .with_objects(
                "fabricNode",
                vec![
                    fabric_node("101", "leaf", "active", "10.0.1.101"),
                    fabric_node("102", "leaf", "inactive", "10.0.1.102"),
                    fabric_node("201", "spine", "active", "10.0.1.201"),
                ],
            )
            .with_objects("infraWiNode", vec![cluster_node("1", "fully-fit"), cluster_node("2", "unavailable")]),
    );
    let mut inputs = collect_common_data(api, None, Some("5.2(1g)"), Credentials::default()).unwrap();
    inputs.sessions = Some(Arc::new(MockSessions::refusing(&["10.0.1.201"])));

    let config = test_config(dir.path(), Duration::from_secs(30));
    let ctx = Arc::new(RunContext::new(dir.path()));
    let report = run_preflight(ctx, &config, inputs, builtin_checks()).unwrap();

    assert_eq!(status_of(&report, "target_version_check"), ResultStatus::FailUpgrade);
    assert_eq!(status_of(&report, "controller_cluster_health"), ResultStatus::FailUpgrade);
    assert_eq!(status_of(&report, "fabric_node_state"), ResultStatus::FailOutage);
    assert_eq!(status_of(&report, "switch_version_check"), ResultStatus::Pass);
    assert_eq!(status_of(&report, "switch_ssh_reachability"), ResultStatus::ManualReview);
    assert_eq!(report.failures().count(), 4);
}

#[test]
fn test_api_only_skips_ssh_checks() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = collect_common_data(Arc::new(MockApi::healthy()), None, None, Credentials::default()).unwrap();

    let mut config = test_config(dir.path(), Duration::from_secs(30));
    config.api_only = true;
    let ctx = Arc::new(RunContext::new(dir.path()));
    let report = run_preflight(Arc::clone(&ctx), &config, inputs, builtin_checks()).unwrap();

    assert!(report.entries.iter().all(|e| e.data_source == DataSource::Api));
    assert!(!ctx.results_dir().join("switch_ssh_reachability.json").exists());
    assert_eq!(report.metadata.total_checks, report.entries.len());
    assert!(report.metadata.api_only);
}

#[test]
fn test_run_without_sessions_can_pass() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = collect_common_data(Arc::new(MockApi::healthy()), None, Some("6.0(2h)"), Credentials::default()).unwrap();
    assert!(inputs.sessions.is_none());

    let config = test_config(dir.path(), Duration::from_secs(30));
    let ctx = Arc::new(RunContext::new(dir.path()));
    let report = run_preflight(ctx, &config, inputs, builtin_checks()).unwrap();

    assert_eq!(report.summary.total, builtin_checks().len());
    assert_eq!(report.summary.failed(), 0, "{:#?}", report.entries);
    let ssh = report.entries.iter().find(|e| e.id == "switch_ssh_reachability").unwrap();
    let result = ssh.result.as_ref().unwrap();
    assert_eq!(result.status(), ResultStatus::NotApplicable);
    assert_eq!(result.message(), NO_SESSIONS_MESSAGE);
}
