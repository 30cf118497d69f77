//! Check execution wrapper.
//!
//! Turns "the routine returned, failed or panicked" into "exactly one
//! [`CheckResult`] reached the store". Check-local failures become ERROR
//! results; the full detail goes to the debug log only. A failure to store
//! the result is not contained and is returned to the caller.

use crate::context::CheckInputs;
use crate::engine::result::{CheckError, CheckResult, ResultStatus, Table};
use crate::engine::store::ResultStore;
use crate::engine::threads::WorkerSlot;
use crate::PreflightError;
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

pub const OUT_OF_MEMORY_MESSAGE: &str = "Not enough memory to complete this check.";

/// Routine returning a typed result.
pub type NativeFn = dyn Fn(&CheckInputs) -> Result<CheckResult, CheckError> + Send + Sync;

/// Routine returning an untyped payload that should decode into a result.
pub type RawFn = dyn Fn(&CheckInputs) -> Result<Value, CheckError> + Send + Sync;

/// A check routine.
#[derive(Clone)]
pub enum CheckRoutine {
    Native(Arc<NativeFn>),
    Raw(Arc<RawFn>),
}

impl CheckRoutine {
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&CheckInputs) -> Result<CheckResult, CheckError> + Send + Sync + 'static,
    {
        CheckRoutine::Native(Arc::new(f))
    }

    pub fn raw<F>(f: F) -> Self
    where
        F: Fn(&CheckInputs) -> Result<Value, CheckError> + Send + Sync + 'static,
    {
        CheckRoutine::Raw(Arc::new(f))
    }
}

impl fmt::Debug for CheckRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckRoutine::Native(_) => f.write_str("CheckRoutine::Native"),
            CheckRoutine::Raw(_) => f.write_str("CheckRoutine::Raw"),
        }
    }
}

pub fn not_a_result_message(check_id: &str) -> String {
    format!("The result of {} is not a Result object", check_id)
}

pub fn unexpected_error_message(detail: impl fmt::Display) -> String {
    format!("Unexpected Error: {}", detail)
}

/// Run a routine and fold every way it can end into one result.
pub fn invoke(check_id: &str, routine: &CheckRoutine, inputs: &CheckInputs) -> CheckResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match routine {
        CheckRoutine::Native(f) => f(inputs).map(Returned::Result),
        CheckRoutine::Raw(f) => f(inputs).map(Returned::Raw),
    }));

    match outcome {
        Ok(Ok(Returned::Result(result))) => result,
        Ok(Ok(Returned::Raw(value))) => decode_raw(check_id, value),
        Ok(Err(CheckError::OutOfMemory)) => {
            debug!(check_id = %check_id, "check ran out of memory");
            CheckResult::error(OUT_OF_MEMORY_MESSAGE)
        }
        Ok(Err(e)) => {
            debug!(check_id = %check_id, error = ?e, "check failed");
            CheckResult::error(unexpected_error_message(&e))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!(check_id = %check_id, panic = %message, "check panicked");
            CheckResult::error(unexpected_error_message(message))
        }
    }
}

enum Returned {
    Result(CheckResult),
    Raw(Value),
}

/// Unvalidated result payload.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCheckResult {
    status: ResultStatus,
    #[serde(default)]
    message: String,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
    #[serde(default)]
    unformatted_headers: Vec<String>,
    #[serde(default)]
    unformatted_rows: Vec<Vec<Value>>,
    #[serde(default)]
    recommended_action: String,
    #[serde(default)]
    doc_url: String,
}

fn decode_raw(check_id: &str, value: Value) -> CheckResult {
    let raw: RawCheckResult = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(check_id = %check_id, error = %e, "check returned a non-result payload");
            return CheckResult::error(not_a_result_message(check_id));
        }
    };

    let tables = Table::from_parts(raw.headers, stringify_rows(raw.rows)).and_then(|table| {
        Table::from_parts(raw.unformatted_headers, stringify_rows(raw.unformatted_rows))
            .map(|unformatted| (table, unformatted))
    });
    match tables {
        Ok((table, unformatted)) => CheckResult::new(raw.status, raw.message)
            .with_tables(table, unformatted)
            .with_recommended_action(raw.recommended_action)
            .with_doc_url(raw.doc_url),
        Err(e) => {
            debug!(check_id = %check_id, error = %e, "check returned a malformed table");
            CheckResult::error(unexpected_error_message(e))
        }
    }
}

fn stringify_rows(rows: Vec<Vec<Value>>) -> Vec<Vec<String>> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|value| match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "check panicked".to_string()
    }
}

/// A routine bound to its identity, title and the store.
#[derive(Clone)]
pub struct CheckWrapper {
    check_id: String,
    title: String,
    routine: CheckRoutine,
    store: Arc<ResultStore>,
}

impl CheckWrapper {
    pub fn new(check_id: &str, title: &str, routine: CheckRoutine, store: Arc<ResultStore>) -> Self {
        CheckWrapper {
            check_id: check_id.to_string(),
            title: title.to_string(),
            routine,
            store,
        }
    }

    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    /// Run the check and store its result.
    ///
    /// When `slot` is given, the result is only written if this worker wins
    /// the claim on it; a result arriving after the timeout is dropped.
    pub fn call(&self, inputs: &CheckInputs, slot: Option<&WorkerSlot>) -> Result<(), PreflightError> {
        self.store.ensure_title(&self.check_id, &self.title);
        debug!(check_id = %self.check_id, "check started");

        let result = invoke(&self.check_id, &self.routine, inputs);

        if let Some(slot) = slot {
            if !slot.claim_finish() {
                debug!(
                    check_id = %self.check_id,
                    status = %result.status(),
                    "check finished after it was already reported, discarding result"
                );
                return Ok(());
            }
        }
        self.store.update_result(&self.check_id, result)
    }
}
