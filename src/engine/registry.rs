//! Check registration.

use crate::context::CheckInputs;
use crate::engine::result::{CheckError, CheckResult};
use crate::engine::wrapper::CheckRoutine;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Where a check gets its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Fabric management API only
    Api,
    /// Needs terminal sessions to individual nodes
    Ssh,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Api => write!(f, "API"),
            DataSource::Ssh => write!(f, "SSH"),
        }
    }
}

/// A check with its routine and metadata.
#[derive(Debug, Clone)]
pub struct RegisteredCheck {
    /// Stable identity; names the record file and the worker thread
    pub id: String,
    /// Human-readable title
    pub title: String,
    pub data_source: DataSource,
    pub routine: CheckRoutine,
    /// Inputs merged into the shared inputs for this check only
    pub extra_inputs: HashMap<String, Value>,
}

impl RegisteredCheck {
    /// Register a typed routine.
    pub fn new<F>(id: &str, title: &str, data_source: DataSource, f: F) -> Self
    where
        F: Fn(&CheckInputs) -> Result<CheckResult, CheckError> + Send + Sync + 'static,
    {
        Self::with_routine(id, title, data_source, CheckRoutine::native(f))
    }

    /// Register a routine returning an untyped payload.
    pub fn raw<F>(id: &str, title: &str, data_source: DataSource, f: F) -> Self
    where
        F: Fn(&CheckInputs) -> Result<Value, CheckError> + Send + Sync + 'static,
    {
        Self::with_routine(id, title, data_source, CheckRoutine::raw(f))
    }

    pub fn with_routine(id: &str, title: &str, data_source: DataSource, routine: CheckRoutine) -> Self {
        RegisteredCheck {
            id: id.to_string(),
            title: title.to_string(),
            data_source,
            routine,
            extra_inputs: HashMap::new(),
        }
    }

    /// Add a check-specific input.
    pub fn with_input(mut self, key: &str, value: Value) -> Self {
        self.extra_inputs.insert(key.to_string(), value);
        self
    }
}
