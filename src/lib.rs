//! fabric-preflight library
//!
//! Read-only pre-upgrade health checks for a network-fabric controller cluster.
//!
//! This library provides:
//! - A check execution engine: one worker thread per check, a global timeout,
//!   per-check failure isolation and a durable per-check JSON result store
//! - A check registry with API-only and debug-selector filtering
//! - Collaborator contracts for the fabric API and terminal sessions
//! - A controller/switch version comparator
//! - A small set of built-in checks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fabric_preflight::{checks, run_preflight, CheckInputs, PreflightConfig, RunContext};
//!
//! let config = PreflightConfig::default();
//! let ctx = Arc::new(RunContext::new(&config.output_dir));
//! let inputs = CheckInputs::default();
//! let report = run_preflight(ctx, &config, inputs, checks::builtin_checks())
//!     .expect("preflight run failed");
//! println!("Checks passed: {}", report.summary.passed());
//! ```

pub mod checks;
pub mod cli;
pub mod context;
pub mod data;
pub mod engine;
pub mod platform;
pub mod version;

use cli::args::Args;
use engine::manager::{CheckManager, ManagerConfig, ProgressHook};
use engine::registry::RegisteredCheck;
use engine::report::PreflightReport;
use engine::store::ResultStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// Re-exports for public API
pub use context::{CheckInputs, Credentials, RunContext, RunMetadata};
pub use engine::result::{CheckError, CheckResult, ResultStatus, RuleStatus, Severity, Table, TableError};
pub use engine::summary::ResultSummary;

/// Error types for fabric-preflight operations.
///
/// Every variant is an integrity failure: it aborts the whole run. Failures
/// local to one check are [`CheckError`] values and never surface here.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// Filesystem problem while reading or writing run output
    #[error("I/O error in {context} ({path}): {source}")]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A record or metadata document could not be encoded or decoded
    #[error("Serialization error in {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    /// Two registered checks share an identity (or an on-disk file name)
    #[error("Duplicate check identity: {check_id}")]
    DuplicateCheck { check_id: String },
    /// The debug selector named a check that is not registered
    #[error("Unknown check requested: {check_id}")]
    UnknownCheck { check_id: String },
    /// A result table violated the row/column invariant at persistence time
    #[error("Invalid result table for {check_id}: {source}")]
    InvalidTable {
        check_id: String,
        #[source]
        source: TableError,
    },
    /// Checks claimed their own result but did not finish writing it within
    /// one poll interval after the global timeout
    #[error("Check results still being written after the timeout: {check_ids}")]
    ResultsPending { check_ids: String },
    /// The orchestrator was driven out of order
    #[error("Invalid manager state: {message}")]
    InvalidState { message: String },
    /// Pre-fetching run-wide data failed before any check started
    #[error("Setup failed in {context}: {message}")]
    Setup { context: String, message: String },
}

/// Configuration for a preflight run.
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// Global timeout for the whole batch of checks
    pub timeout: Duration,
    /// How often the monitor loop polls workers
    pub poll_interval: Duration,
    /// Run only checks whose data comes from the fabric API
    pub api_only: bool,
    /// Comma-separated check identities to run instead of the full list
    pub debug_function: Option<String>,
    /// Directory receiving the log file, metadata and per-check records
    pub output_dir: PathBuf,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        PreflightConfig {
            timeout: Duration::from_secs(1200),
            poll_interval: Duration::from_secs(1),
            api_only: false,
            debug_function: None,
            output_dir: PathBuf::from("preupgrade_validator_logs"),
        }
    }
}

impl PreflightConfig {
    /// Create configuration from command line arguments
    pub fn from_args(args: &Args) -> Self {
        let defaults = PreflightConfig::default();
        PreflightConfig {
            timeout: Duration::from_secs(args.timeout),
            poll_interval: defaults.poll_interval,
            api_only: args.api_only,
            debug_function: args.debug_function.clone(),
            output_dir: args.output_dir.clone(),
        }
    }

    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            api_only: self.api_only,
            debug_function: self.debug_function.clone(),
        }
    }
}

/// Run a batch of checks end to end.
///
/// Opens the result store under the run context, writes an in-progress
/// record for every resolved check, writes the run metadata, runs all checks
/// concurrently and returns the finalized report.
///
/// Only integrity failures are returned as errors; a check that fails,
/// panics or times out is recorded as an ERROR result instead.
pub fn run_preflight(
    ctx: Arc<RunContext>,
    config: &PreflightConfig,
    inputs: CheckInputs,
    checks: Vec<RegisteredCheck>,
) -> Result<PreflightReport, PreflightError> {
    run_preflight_with_progress(ctx, config, inputs, checks, None)
}

/// [`run_preflight`], reporting `(finished, total)` as checks complete.
pub fn run_preflight_with_progress(
    ctx: Arc<RunContext>,
    config: &PreflightConfig,
    inputs: CheckInputs,
    checks: Vec<RegisteredCheck>,
    progress: Option<ProgressHook>,
) -> Result<PreflightReport, PreflightError> {
    let store = Arc::new(ResultStore::open(ctx.results_dir())?);
    let mut manager = CheckManager::new(config.manager_config(), Arc::clone(&store), checks);
    if let Some(hook) = progress {
        manager.set_progress_hook(hook);
    }

    manager.initialize_checks()?;

    let metadata = RunMetadata::new(&ctx, &inputs, config, manager.total_checks());
    metadata.write(&ctx.metadata_path())?;

    manager.run_checks(inputs)?;

    Ok(PreflightReport::from_manager(&manager, metadata))
}
