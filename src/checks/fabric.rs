//! Fabric health checks.
//!
//! Controller cluster fitness and switch node state, read from the
//! management API.

use crate::checks::{fabric_objects, CLUSTER_NODES, FABRIC_NODES};
use crate::context::CheckInputs;
use crate::engine::result::{CheckError, CheckResult, ResultStatus};
use crate::platform::api::attribute;

const FULLY_FIT: &str = "fully-fit";
const ACTIVE: &str = "active";

/// Every controller must report the cluster as fully fit.
pub fn controller_cluster_health(inputs: &CheckInputs) -> Result<CheckResult, CheckError> {
    let nodes = fabric_objects(inputs, CLUSTER_NODES)?;
    if nodes.is_empty() {
        return Ok(CheckResult::new(
            ResultStatus::ManualReview,
            "No controller cluster data returned",
        ));
    }

    let mut rows = Vec::new();
    for node in nodes.iter() {
        let health = attribute(node, "health").unwrap_or("unknown");
        if health != FULLY_FIT {
            rows.push([
                attribute(node, "id").unwrap_or("?").to_string(),
                attribute(node, "nodeName").unwrap_or("?").to_string(),
                health.to_string(),
            ]);
        }
    }

    if rows.is_empty() {
        return Ok(CheckResult::pass());
    }
    Ok(CheckResult::new(
        ResultStatus::FailUpgrade,
        format!("{} controller(s) not fully fit", rows.len()),
    )
    .with_table(["Controller ID", "Name", "Health"], rows)?
    .with_recommended_action("Restore the controller cluster to fully-fit before upgrading."))
}

/// Leaf and spine switches must be active.
pub fn fabric_node_state(inputs: &CheckInputs) -> Result<CheckResult, CheckError> {
    let nodes = fabric_objects(inputs, FABRIC_NODES)?;

    let mut rows = Vec::new();
    let mut unparsed = Vec::new();
    for node in nodes.iter() {
        let fields = (
            attribute(node, "id"),
            attribute(node, "name"),
            attribute(node, "role"),
            attribute(node, "fabricSt"),
        );
        match fields {
            (Some(id), Some(name), Some(role), Some(state)) => {
                if matches!(role, "leaf" | "spine") && state != ACTIVE {
                    rows.push([id, name, role, state]);
                }
            }
            _ => unparsed.push([node.to_string()]),
        }
    }

    if rows.is_empty() && unparsed.is_empty() {
        return Ok(CheckResult::pass());
    }
    let status = if rows.is_empty() {
        ResultStatus::ManualReview
    } else {
        ResultStatus::FailOutage
    };
    Ok(CheckResult::new(status, "")
        .with_table(["Node ID", "Name", "Role", "State"], rows)?
        .with_unformatted_table(["Raw Object"], unparsed)?
        .with_recommended_action("Bring inactive switches back into the fabric or decommission them."))
}
