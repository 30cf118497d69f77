//! Worker thread management.
//!
//! One named OS thread per check. Threads are never joined on the way out of
//! the process, so a worker stuck in blocking I/O cannot keep the program
//! alive after the run is reported.
//!
//! # Cancellation
//!
//! Cancellation is advisory. The [`TimeoutEvent`] is set when the global
//! timeout fires and checks may poll it between blocking calls, but nothing
//! interrupts a call already in progress. Such a worker keeps running in the
//! background after its check has been reported as timed out; its late
//! result is discarded because the timeout already claimed the worker's slot.
//!
//! # Worker states
//!
//! `Created -> Started -> Running -> Finalizing -> Finished`, or
//! `Created -> StartFailed`, or `Created | Started | Running -> TimedOut`.
//! The transition into `Finalizing` (the worker reports its own result) and
//! into `TimedOut` (the monitor reports for it) are both compare-and-swap
//! claims, so exactly one of them wins.

use crate::PreflightError;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// What a worker body returns: `Err` only for integrity failures.
pub type WorkerOutcome = Result<(), PreflightError>;

/// Body handed to a [`SpawnThread`] implementation.
pub type WorkerBody = Box<dyn FnOnce() -> WorkerOutcome + Send + 'static>;

/// Shared cancellation flag set when the global timeout fires.
#[derive(Debug, Clone, Default)]
pub struct TimeoutEvent(Arc<AtomicBool>);

impl TimeoutEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Started = 1,
    Running = 2,
    Finalizing = 3,
    Finished = 4,
    StartFailed = 5,
    TimedOut = 6,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Started,
            2 => WorkerState::Running,
            3 => WorkerState::Finalizing,
            4 => WorkerState::Finished,
            5 => WorkerState::StartFailed,
            _ => WorkerState::TimedOut,
        }
    }

    /// No further transitions happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerState::Finished | WorkerState::StartFailed | WorkerState::TimedOut
        )
    }
}

/// State shared between a worker thread and the monitor.
#[derive(Debug)]
pub struct WorkerSlot {
    name: String,
    state: AtomicU8,
}

impl WorkerSlot {
    fn new(name: &str) -> Self {
        WorkerSlot {
            name: name.to_string(),
            state: AtomicU8::new(WorkerState::Created as u8),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: &[WorkerState], to: WorkerState) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if !from.contains(&WorkerState::from_u8(current)) {
                return false;
            }
            match self
                .state
                .compare_exchange(current, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Claim the right to write this worker's own result.
    pub fn claim_finish(&self) -> bool {
        self.transition(
            &[WorkerState::Created, WorkerState::Started, WorkerState::Running],
            WorkerState::Finalizing,
        )
    }

    /// Claim the right to write a timeout result on the worker's behalf.
    pub fn claim_timeout(&self) -> bool {
        self.transition(
            &[WorkerState::Created, WorkerState::Started, WorkerState::Running],
            WorkerState::TimedOut,
        )
    }

    fn mark_running(&self) {
        self.transition(&[WorkerState::Created, WorkerState::Started], WorkerState::Running);
    }

    fn mark_started(&self) {
        self.transition(&[WorkerState::Created], WorkerState::Started);
    }

    fn mark_finished(&self) {
        self.transition(
            &[WorkerState::Running, WorkerState::Finalizing],
            WorkerState::Finished,
        );
    }

    fn mark_start_failed(&self) {
        self.transition(&[WorkerState::Created], WorkerState::StartFailed);
    }
}

/// Whether the calling thread is the worker for one of `check_ids`.
///
/// Workers are named after their check, see [`ThreadManager::start_thread`].
pub fn on_worker_thread(check_ids: &HashSet<String>) -> bool {
    thread::current().name().map_or(false, |name| check_ids.contains(name))
}

/// Creates OS threads for workers.
pub trait SpawnThread: Send + Sync {
    fn spawn(&self, name: &str, body: WorkerBody) -> io::Result<JoinHandle<WorkerOutcome>>;
}

/// Spawns named threads through [`std::thread::Builder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSpawner;

impl SpawnThread for OsSpawner {
    fn spawn(&self, name: &str, body: WorkerBody) -> io::Result<JoinHandle<WorkerOutcome>> {
        thread::Builder::new().name(name.to_string()).spawn(body)
    }
}

/// A worker whose thread ended, as seen by the monitor.
#[derive(Debug)]
pub struct ReapedWorker {
    pub slot: Arc<WorkerSlot>,
    /// `Err` when the thread panicked outside the check routine
    pub outcome: thread::Result<WorkerOutcome>,
}

struct Worker {
    slot: Arc<WorkerSlot>,
    handle: Option<JoinHandle<WorkerOutcome>>,
}

impl Worker {
    /// Nothing is left to collect from this worker.
    ///
    /// A worker that wrote its own result only settles once its thread has
    /// been reaped, so an error returned after the state flip is not lost.
    /// A timed-out worker settles immediately; its thread may never exit.
    fn is_settled(&self) -> bool {
        match self.slot.state() {
            WorkerState::StartFailed | WorkerState::TimedOut => true,
            WorkerState::Finished => self.handle.is_none(),
            _ => false,
        }
    }

    /// Claimed its own result but its outcome has not been reaped yet.
    fn is_reporting(&self) -> bool {
        self.handle.is_some()
            && matches!(self.slot.state(), WorkerState::Finalizing | WorkerState::Finished)
    }
}

/// Launches and tracks check workers.
pub struct ThreadManager {
    spawner: Box<dyn SpawnThread>,
    timeout_event: TimeoutEvent,
    workers: Vec<Worker>,
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadManager {
    pub fn new() -> Self {
        Self::with_spawner(Box::new(OsSpawner))
    }

    pub fn with_spawner(spawner: Box<dyn SpawnThread>) -> Self {
        ThreadManager {
            spawner,
            timeout_event: TimeoutEvent::new(),
            workers: Vec::new(),
        }
    }

    pub fn timeout_event(&self) -> &TimeoutEvent {
        &self.timeout_event
    }

    /// Start a named worker running `target`.
    ///
    /// If the thread cannot be created, the worker is marked `StartFailed`
    /// and `on_start_failure` is called with its name instead of returning
    /// the spawn error, so the caller can keep launching other workers. An
    /// error returned by the callback itself is passed through.
    pub fn start_thread<F, C>(
        &mut self,
        name: &str,
        target: F,
        on_start_failure: C,
    ) -> Result<Arc<WorkerSlot>, PreflightError>
    where
        F: FnOnce(&WorkerSlot) -> WorkerOutcome + Send + 'static,
        C: FnOnce(&str, &io::Error) -> Result<(), PreflightError>,
    {
        let slot = Arc::new(WorkerSlot::new(name));
        let body_slot = Arc::clone(&slot);
        let body: WorkerBody = Box::new(move || {
            body_slot.mark_running();
            let outcome = target(&body_slot);
            body_slot.mark_finished();
            outcome
        });

        match self.spawner.spawn(name, body) {
            Ok(handle) => {
                slot.mark_started();
                debug!(worker = %name, "worker started");
                self.workers.push(Worker {
                    slot: Arc::clone(&slot),
                    handle: Some(handle),
                });
            }
            Err(e) => {
                warn!(worker = %name, error = %e, "failed to start worker thread");
                slot.mark_start_failed();
                self.workers.push(Worker {
                    slot: Arc::clone(&slot),
                    handle: None,
                });
                on_start_failure(name, &e)?;
            }
        }
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Workers that settled: reaped, timed out or never started.
    pub fn finished_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_settled()).count()
    }

    pub fn all_finished(&self) -> bool {
        self.workers.iter().all(Worker::is_settled)
    }

    /// Slots of workers that have not reached a terminal state.
    pub fn unfinished(&self) -> Vec<Arc<WorkerSlot>> {
        self.workers
            .iter()
            .filter(|w| !w.slot.state().is_terminal())
            .map(|w| Arc::clone(&w.slot))
            .collect()
    }

    /// Join every thread that has exited and hand back its outcome.
    ///
    /// Each thread is reaped at most once.
    pub fn reap(&mut self) -> Vec<ReapedWorker> {
        let mut reaped = Vec::new();
        for worker in &mut self.workers {
            let exited = worker.handle.as_ref().map_or(false, |h| h.is_finished());
            if !exited {
                continue;
            }
            if let Some(handle) = worker.handle.take() {
                reaped.push(ReapedWorker {
                    slot: Arc::clone(&worker.slot),
                    outcome: handle.join(),
                });
            }
        }
        reaped
    }

    /// Names of workers that claimed their own result and have not been reaped.
    pub fn reporting(&self) -> Vec<String> {
        self.workers
            .iter()
            .filter(|w| w.is_reporting())
            .map(|w| w.slot.name().to_string())
            .collect()
    }

    /// Force a slot whose thread died without reporting into `Finished`.
    pub(crate) fn mark_abandoned(slot: &WorkerSlot) {
        slot.transition(
            &[
                WorkerState::Created,
                WorkerState::Started,
                WorkerState::Running,
                WorkerState::Finalizing,
            ],
            WorkerState::Finished,
        );
    }
}
