//! Check manager: the top-level run loop.
//!
//! Resolves the check list, writes an in-progress record for every check,
//! launches one worker per check and then polls until every worker has
//! reported or the global timeout fires.
//!
//! # Failure handling
//!
//! - A check that fails, panics, cannot start or times out gets an ERROR
//!   record; the other checks are unaffected.
//! - Setup errors (duplicate identity, unknown selector, unwritable store)
//!   and any failure to write a record are returned to the caller and abort
//!   the run.
//!
//! Checks that are still blocked when the timeout fires are reported as
//! timed out but keep running in the background; see
//! [`crate::engine::threads`].

use crate::context::CheckInputs;
use crate::engine::registry::{DataSource, RegisteredCheck};
use crate::engine::result::CheckResult;
use crate::engine::store::{record_file_name, ResultStore};
use crate::engine::summary::ResultSummary;
use crate::engine::threads::{SpawnThread, ThreadManager};
use crate::engine::wrapper::CheckWrapper;
use crate::PreflightError;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const THREAD_START_FAILURE_MESSAGE: &str =
    "Skipped due to a failure in starting a thread for this check.";

pub const EARLY_TERMINATION_MESSAGE: &str =
    "Unexpected Error: worker thread terminated before reporting a result";

/// Wait between polls while a worker writes a result it already claimed.
const FINALIZE_WAIT: Duration = Duration::from_millis(5);

/// Message recorded for a check still running when the timeout fires.
pub fn timeout_message(timeout: Duration) -> String {
    let secs = if timeout.subsec_nanos() == 0 {
        timeout.as_secs().to_string()
    } else {
        timeout.as_secs_f64().to_string()
    };
    format!("Timeout. Unable to finish in time ({} sec).", secs)
}

/// Check manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub api_only: bool,
    pub debug_function: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            timeout: Duration::from_secs(1200),
            poll_interval: Duration::from_secs(1),
            api_only: false,
            debug_function: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    NotInitialized,
    Initialized,
    Running,
    Done,
}

/// Called with (finished, total) whenever the finished count changes.
pub type ProgressHook = Box<dyn FnMut(usize, usize) + Send>;

pub struct CheckManager {
    config: ManagerConfig,
    store: Arc<ResultStore>,
    registered: Vec<RegisteredCheck>,
    resolved: Vec<RegisteredCheck>,
    state: ManagerState,
    spawner: Option<Box<dyn SpawnThread>>,
    progress: Option<ProgressHook>,
}

impl CheckManager {
    pub fn new(config: ManagerConfig, store: Arc<ResultStore>, checks: Vec<RegisteredCheck>) -> Self {
        CheckManager {
            config,
            store,
            registered: checks,
            resolved: Vec::new(),
            state: ManagerState::NotInitialized,
            spawner: None,
            progress: None,
        }
    }

    /// Use a custom thread spawner for the workers.
    pub fn with_spawner(mut self, spawner: Box<dyn SpawnThread>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn set_progress_hook(&mut self, hook: ProgressHook) {
        self.progress = Some(hook);
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Resolve the check list and write an in-progress record for each.
    ///
    /// Errors here are setup problems and abort the run.
    pub fn initialize_checks(&mut self) -> Result<(), PreflightError> {
        if self.state != ManagerState::NotInitialized {
            return Err(PreflightError::InvalidState {
                message: format!("initialize_checks called in state {:?}", self.state),
            });
        }

        let resolved = self.resolve()?;
        for check in &resolved {
            self.store.init_result(&check.id, &check.title)?;
        }
        info!(
            total = resolved.len(),
            registered = self.registered.len(),
            "checks initialized"
        );

        self.resolved = resolved;
        self.state = ManagerState::Initialized;
        Ok(())
    }

    fn resolve(&self) -> Result<Vec<RegisteredCheck>, PreflightError> {
        let mut ids = HashSet::new();
        let mut file_names = HashSet::new();
        for check in &self.registered {
            if !ids.insert(check.id.as_str()) || !file_names.insert(record_file_name(&check.id)) {
                return Err(PreflightError::DuplicateCheck {
                    check_id: check.id.clone(),
                });
            }
        }

        let wanted: Vec<&str> = self
            .config
            .debug_function
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();

        if !wanted.is_empty() {
            if let Some(unknown) = wanted.iter().find(|id| !ids.contains(*id)) {
                return Err(PreflightError::UnknownCheck {
                    check_id: unknown.to_string(),
                });
            }
            return Ok(self
                .registered
                .iter()
                .filter(|c| wanted.contains(&c.id.as_str()))
                .cloned()
                .collect());
        }

        Ok(self
            .registered
            .iter()
            .filter(|c| !self.config.api_only || c.data_source == DataSource::Api)
            .cloned()
            .collect())
    }

    /// Run every resolved check and wait for all of them or the timeout.
    ///
    /// Initializes first if that has not happened yet. On return every
    /// resolved check has a final record, unless an error is returned.
    pub fn run_checks(&mut self, common: CheckInputs) -> Result<(), PreflightError> {
        match self.state {
            ManagerState::NotInitialized => self.initialize_checks()?,
            ManagerState::Initialized => {}
            state => {
                return Err(PreflightError::InvalidState {
                    message: format!("run_checks called in state {:?}", state),
                })
            }
        }
        self.state = ManagerState::Running;

        let mut threads = match self.spawner.take() {
            Some(spawner) => ThreadManager::with_spawner(spawner),
            None => ThreadManager::new(),
        };
        let mut common = common;
        common.timeout_event = threads.timeout_event().clone();

        info!(
            total = self.resolved.len(),
            timeout_secs = self.config.timeout.as_secs(),
            "starting checks"
        );

        for check in &self.resolved {
            let wrapper = CheckWrapper::new(
                &check.id,
                &check.title,
                check.routine.clone(),
                Arc::clone(&self.store),
            );
            let inputs = common.merged_with(&check.extra_inputs);
            threads.start_thread(
                &check.id,
                move |slot| wrapper.call(&inputs, Some(slot)),
                |check_id, err| self.finalize_check_on_thread_failure(check_id, err),
            )?;
        }

        self.monitor(&mut threads)?;
        self.state = ManagerState::Done;

        let summary = self.summary();
        info!(
            total = summary.total,
            passed = summary.passed(),
            failed = summary.failed(),
            "checks done"
        );
        Ok(())
    }

    fn monitor(&mut self, threads: &mut ThreadManager) -> Result<(), PreflightError> {
        let started = Instant::now();
        let mut reported = None;

        loop {
            self.reap(threads)?;
            self.report_progress(threads, &mut reported);

            if threads.all_finished() {
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.timeout {
                self.expire(threads)?;
                self.report_progress(threads, &mut reported);
                return Ok(());
            }
            thread::sleep(self.config.poll_interval.min(self.config.timeout - elapsed));
        }
    }

    /// Report every unfinished check as timed out.
    fn expire(&self, threads: &mut ThreadManager) -> Result<(), PreflightError> {
        threads.timeout_event().set();
        let unfinished = threads.unfinished();
        warn!(
            timeout_secs = self.config.timeout.as_secs(),
            unfinished = unfinished.len(),
            "global timeout reached"
        );

        for slot in unfinished {
            if slot.claim_timeout() {
                self.finalize_check_on_thread_timeout(slot.name())?;
            }
        }

        // Workers that claimed their own result before the deadline get one
        // more poll interval to finish writing it.
        let grace = Instant::now() + self.config.poll_interval;
        loop {
            self.reap(threads)?;
            let pending = threads.reporting();
            if pending.is_empty() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= grace {
                error!(checks = ?pending, "check results still being written after the timeout");
                return Err(PreflightError::ResultsPending {
                    check_ids: pending.join(", "),
                });
            }
            thread::sleep(FINALIZE_WAIT.min(grace - now));
        }
    }

    fn reap(&self, threads: &mut ThreadManager) -> Result<(), PreflightError> {
        for reaped in threads.reap() {
            let check_id = reaped.slot.name();
            match reaped.outcome {
                Ok(Ok(())) => debug!(check_id = %check_id, "worker exited"),
                Ok(Err(e)) => {
                    error!(check_id = %check_id, error = %e, "failed to record check result");
                    return Err(e);
                }
                Err(_) => {
                    if reaped.slot.state().is_terminal() {
                        continue;
                    }
                    ThreadManager::mark_abandoned(&reaped.slot);
                    warn!(check_id = %check_id, "worker terminated without reporting");
                    self.store
                        .update_result(check_id, CheckResult::error(EARLY_TERMINATION_MESSAGE))?;
                }
            }
        }
        Ok(())
    }

    fn report_progress(&mut self, threads: &ThreadManager, reported: &mut Option<usize>) {
        let finished = threads.finished_count();
        if *reported == Some(finished) {
            return;
        }
        *reported = Some(finished);
        if let Some(hook) = self.progress.as_mut() {
            hook(finished, threads.len());
        }
    }

    /// Record a check whose worker thread could not be started.
    pub fn finalize_check_on_thread_failure(&self, check_id: &str, err: &io::Error) -> Result<(), PreflightError> {
        warn!(check_id = %check_id, error = %err, "check skipped, worker did not start");
        self.store
            .update_result(check_id, CheckResult::error(THREAD_START_FAILURE_MESSAGE))
    }

    /// Record a check that did not finish before the global timeout.
    pub fn finalize_check_on_thread_timeout(&self, check_id: &str) -> Result<(), PreflightError> {
        warn!(check_id = %check_id, "check timed out");
        self.store
            .update_result(check_id, CheckResult::error(timeout_message(self.config.timeout)))
    }

    pub fn get_check_result(&self, check_id: &str) -> Option<CheckResult> {
        self.store.get_result(check_id)
    }

    pub fn get_check_title(&self, check_id: &str) -> Option<String> {
        self.store.get_title(check_id)
    }

    /// Number of checks after filtering.
    pub fn total_checks(&self) -> usize {
        self.resolved.len()
    }

    /// Resolved checks in launch order.
    pub fn checks(&self) -> &[RegisteredCheck] {
        &self.resolved
    }

    pub fn summary(&self) -> ResultSummary {
        self.store.get_summary()
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }
}
