//! Built-in upgrade-readiness checks.
//!
//! Checks are organized by what they look at:
//! - Version: target version sanity, switch version consistency
//! - Fabric: controller cluster health, fabric node state
//! - Switch: terminal access to switches
//!
//! Every check reads pre-fetched snapshots from [`CheckInputs`] when
//! present and falls back to querying the API itself.

pub mod fabric;
pub mod switch;
pub mod version;

use crate::context::{CheckInputs, Credentials};
use crate::data::version::FabricVersion;
use crate::engine::registry::{DataSource, RegisteredCheck};
use crate::engine::result::CheckError;
use crate::platform::api::{attribute, FabricApi};
use crate::PreflightError;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const CONTROLLER_FIRMWARE: &str = "firmwareCtrlrRunning";
pub const SWITCH_FIRMWARE: &str = "firmwareRunning";
pub const FABRIC_NODES: &str = "fabricNode";
pub const CLUSTER_NODES: &str = "infraWiNode";

/// All built-in checks, in report order.
pub fn builtin_checks() -> Vec<RegisteredCheck> {
    vec![
        RegisteredCheck::new(
            "target_version_check",
            "Target Version Compatibility",
            DataSource::Api,
            version::target_version_check,
        ),
        RegisteredCheck::new(
            "switch_version_check",
            "Switch Version Consistency",
            DataSource::Api,
            version::switch_version_check,
        ),
        RegisteredCheck::new(
            "controller_cluster_health",
            "Controller Cluster Health",
            DataSource::Api,
            fabric::controller_cluster_health,
        ),
        RegisteredCheck::new(
            "fabric_node_state",
            "Fabric Node State",
            DataSource::Api,
            fabric::fabric_node_state,
        ),
        RegisteredCheck::new(
            "switch_ssh_reachability",
            "Switch Terminal Access",
            DataSource::Ssh,
            switch::switch_ssh_reachability,
        ),
    ]
}

/// Objects of one class: the shared snapshot if present, else a live query.
pub(crate) fn fabric_objects(inputs: &CheckInputs, kind: &str) -> Result<Arc<Vec<Value>>, CheckError> {
    if let Some(objects) = inputs.snapshot(kind) {
        return Ok(objects);
    }
    let api = inputs
        .api
        .as_ref()
        .ok_or_else(|| CheckError::unexpected(format!("no data source for {}", kind)))?;
    Ok(Arc::new(api.fetch(kind, "")?))
}

/// Node id from a distinguished name such as `topology/pod-1/node-101/sys`.
pub(crate) fn node_id_from_dn(dn: &str) -> Option<&str> {
    dn.split('/').find_map(|part| part.strip_prefix("node-"))
}

/// Fetch the run-wide inputs shared by every check.
///
/// Versions passed on the command line win over what the fabric reports.
/// Any failure here aborts the run before checks start.
pub fn collect_common_data(
    api: Arc<dyn FabricApi>,
    cversion: Option<&str>,
    tversion: Option<&str>,
    credentials: Credentials,
) -> Result<CheckInputs, PreflightError> {
    let setup = |context: &str, message: String| PreflightError::Setup {
        context: context.to_string(),
        message,
    };
    let parse = |context: &str, raw: &str| {
        raw.parse::<FabricVersion>()
            .map_err(|e| setup(context, e.to_string()))
    };
    let fetch = |kind: &str| {
        api.fetch(kind, "")
            .map(Arc::new)
            .map_err(|e| setup(kind, e.to_string()))
    };

    let tversion = tversion.map(|raw| parse("target version", raw)).transpose()?;

    let cversion = match cversion {
        Some(raw) => Some(parse("current version", raw)?),
        None => {
            let controllers = fetch(CONTROLLER_FIRMWARE)?;
            let raw = controllers
                .iter()
                .find_map(|obj| attribute(obj, "version"))
                .ok_or_else(|| setup(CONTROLLER_FIRMWARE, "no controller version reported".to_string()))?;
            Some(parse("current version", raw)?)
        }
    };

    let switch_firmware = fetch(SWITCH_FIRMWARE)?;
    let sw_cversion = switch_firmware
        .iter()
        .filter_map(|obj| attribute(obj, "version"))
        .filter_map(|raw| raw.parse::<FabricVersion>().ok())
        .min();

    let nodes = fetch(FABRIC_NODES)?;

    let mut inputs = CheckInputs {
        cversion,
        tversion,
        sw_cversion,
        credentials,
        api: Some(Arc::clone(&api)),
        ..CheckInputs::default()
    };
    inputs.snapshots.insert(SWITCH_FIRMWARE.to_string(), switch_firmware);
    inputs.snapshots.insert(FABRIC_NODES.to_string(), nodes);

    info!(
        cversion = ?inputs.cversion.as_ref().map(ToString::to_string),
        tversion = ?inputs.tversion.as_ref().map(ToString::to_string),
        sw_cversion = ?inputs.sw_cversion.as_ref().map(ToString::to_string),
        "common data collected"
    );
    Ok(inputs)
}
