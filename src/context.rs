//! Run-wide context and shared check inputs.
//!
//! [`RunContext`] is built once at process start and never changes. It
//! carries the paths and timestamp every component needs.
//! [`CheckInputs`] is the read-only bag of shared data handed to each check.

use crate::data::version::FabricVersion;
use crate::engine::store::write_atomic;
use crate::engine::threads::TimeoutEvent;
use crate::platform::api::FabricApi;
use crate::platform::session::SessionFactory;
use crate::{PreflightConfig, PreflightError};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RESULTS_DIR: &str = "json_results";
const METADATA_FILE: &str = "meta.json";
const LOG_FILE: &str = "preflight.log";

/// Immutable paths and identity of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    output_dir: PathBuf,
    started_at: DateTime<Local>,
    tool_version: &'static str,
}

impl RunContext {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self::with_timestamp(output_dir, Local::now())
    }

    pub fn with_timestamp(output_dir: impl AsRef<Path>, started_at: DateTime<Local>) -> Self {
        RunContext {
            output_dir: output_dir.as_ref().to_path_buf(),
            started_at,
            tool_version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory holding one JSON record per check.
    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join(RESULTS_DIR)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.output_dir.join(METADATA_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(LOG_FILE)
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Name used for the result bundle, derived from the start time.
    pub fn bundle_name(&self) -> String {
        format!("preupgrade_validator_{}", self.started_at.format("%Y-%m-%dT%H-%M-%S%z"))
    }

    pub fn tool_version(&self) -> &'static str {
        self.tool_version
    }
}

/// Login used for the fabric API and terminal sessions.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Shared read-only inputs for every check.
///
/// Common fields are typed. Anything a single check needs beyond them goes
/// through `extra`, keyed by name.
#[derive(Clone, Default)]
pub struct CheckInputs {
    /// Version the controllers currently run
    pub cversion: Option<FabricVersion>,
    /// Version the fabric is being upgraded to
    pub tversion: Option<FabricVersion>,
    /// Lowest version found across switches
    pub sw_cversion: Option<FabricVersion>,
    pub credentials: Credentials,
    /// Pre-fetched fabric state, keyed by resource kind
    pub snapshots: HashMap<String, Arc<Vec<Value>>>,
    pub api: Option<Arc<dyn FabricApi>>,
    pub sessions: Option<Arc<dyn SessionFactory>>,
    /// Set when the global timeout fires; checks may poll it
    pub timeout_event: TimeoutEvent,
    pub extra: HashMap<String, Value>,
}

impl fmt::Debug for CheckInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckInputs")
            .field("cversion", &self.cversion)
            .field("tversion", &self.tversion)
            .field("sw_cversion", &self.sw_cversion)
            .field("credentials", &self.credentials)
            .field("snapshots", &self.snapshots.keys().collect::<Vec<_>>())
            .field("api", &self.api.is_some())
            .field("sessions", &self.sessions.is_some())
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CheckInputs {
    /// Copy of these inputs with per-check keys layered on top of `extra`.
    pub fn merged_with(&self, extra: &HashMap<String, Value>) -> CheckInputs {
        let mut inputs = self.clone();
        for (key, value) in extra {
            inputs.extra.insert(key.clone(), value.clone());
        }
        inputs
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn snapshot(&self, kind: &str) -> Option<Arc<Vec<Value>>> {
        self.snapshots.get(kind).cloned()
    }
}

/// Metadata describing a run, written once after the check list is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub name: String,
    pub method: String,
    pub datetime: String,
    pub script_version: String,
    pub cversion: String,
    pub tversion: String,
    pub sw_cversion: String,
    pub api_only: bool,
    pub timeout: u64,
    pub total_checks: usize,
}

impl RunMetadata {
    pub fn new(ctx: &RunContext, inputs: &CheckInputs, config: &PreflightConfig, total_checks: usize) -> Self {
        let version_text = |v: &Option<FabricVersion>| v.as_ref().map(ToString::to_string).unwrap_or_default();
        RunMetadata {
            name: "PreupgradeCheck".to_string(),
            method: "standalone script".to_string(),
            datetime: ctx.started_at().format("%Y-%m-%dT%H:%M:%S%z").to_string(),
            script_version: ctx.tool_version().to_string(),
            cversion: version_text(&inputs.cversion),
            tversion: version_text(&inputs.tversion),
            sw_cversion: version_text(&inputs.sw_cversion),
            api_only: config.api_only,
            timeout: config.timeout.as_secs(),
            total_checks,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), PreflightError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| PreflightError::Serialization {
            context: "encode run metadata".to_string(),
            source,
        })?;
        write_atomic(path, &bytes)
    }
}
