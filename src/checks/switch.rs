//! Checks that need a terminal session on each switch.

use crate::checks::{fabric_objects, FABRIC_NODES};
use crate::context::CheckInputs;
use crate::engine::result::{CheckError, CheckResult, ResultStatus};
use crate::platform::api::attribute;
use crate::platform::session::TerminalSession;
use crate::platform::PlatformError;
use std::time::Duration;
use tracing::{debug, warn};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_COMMAND: &str = "show version";

pub const NO_SESSIONS_MESSAGE: &str = "Terminal sessions are not configured for this run";

/// Every active switch must accept a login and run a command.
///
/// N/A when no terminal session transport was supplied. Stops early once the
/// run has timed out; the result is discarded anyway.
pub fn switch_ssh_reachability(inputs: &CheckInputs) -> Result<CheckResult, CheckError> {
    let Some(sessions) = inputs.sessions.as_ref() else {
        debug!("no session factory, switch reachability not checked");
        return Ok(CheckResult::new(ResultStatus::NotApplicable, NO_SESSIONS_MESSAGE)
            .with_recommended_action("Run from a host with switch terminal access to cover this check."));
    };
    let nodes = fabric_objects(inputs, FABRIC_NODES)?;

    let mut rows = Vec::new();
    let mut probed = 0usize;
    for node in nodes.iter() {
        if inputs.timeout_event.is_set() {
            debug!("timeout set, stopping switch probes");
            break;
        }
        let is_switch = matches!(attribute(node, "role"), Some("leaf" | "spine"));
        if !is_switch || attribute(node, "fabricSt") != Some("active") {
            continue;
        }
        let (Some(id), Some(address)) = (attribute(node, "id"), attribute(node, "address")) else {
            continue;
        };

        probed += 1;
        let mut session = sessions.open(address, &inputs.credentials);
        if let Err(e) = probe(session.as_mut()) {
            warn!(node = id, address, error = %e, "switch probe failed");
            rows.push([id.to_string(), address.to_string(), e.to_string()]);
        }
    }

    if probed == 0 {
        return Ok(CheckResult::new(ResultStatus::NotApplicable, "No active switches found"));
    }
    if rows.is_empty() {
        return Ok(CheckResult::pass());
    }
    Ok(CheckResult::new(
        ResultStatus::ManualReview,
        format!("{} of {} switches unreachable", rows.len(), probed),
    )
    .with_table(["Node ID", "Address", "Error"], rows)?
    .with_recommended_action("Verify switch login with the supplied credentials."))
}

fn probe(session: &mut dyn TerminalSession) -> Result<(), PlatformError> {
    session.connect()?;
    session.login()?;
    session.run(PROBE_COMMAND, COMMAND_TIMEOUT)?;
    Ok(())
}
