//! Version sanity checks.
//!
//! Compares the running controller and switch versions against the target
//! and against each other.

use crate::checks::{fabric_objects, node_id_from_dn, SWITCH_FIRMWARE};
use crate::context::CheckInputs;
use crate::data::version::FabricVersion;
use crate::engine::result::{CheckError, CheckResult, ResultStatus};
use crate::platform::api::attribute;
use std::collections::BTreeSet;
use tracing::debug;

/// Target version must be supplied and must not be a downgrade.
pub fn target_version_check(inputs: &CheckInputs) -> Result<CheckResult, CheckError> {
    let (cversion, tversion) = match (&inputs.cversion, &inputs.tversion) {
        (Some(c), Some(t)) => (c, t),
        (None, _) => {
            return Ok(CheckResult::new(ResultStatus::ManualReview, "Current version unknown"));
        }
        (_, None) => {
            return Ok(CheckResult::new(ResultStatus::ManualReview, "Target version not supplied")
                .with_recommended_action("Re-run with the target version."));
        }
    };

    if tversion.same_as(cversion) {
        return Ok(CheckResult::new(
            ResultStatus::NotApplicable,
            "Target version is the current version",
        ));
    }

    if tversion.older_than(cversion) {
        return Ok(CheckResult::new(ResultStatus::FailUpgrade, "Downgrade is not supported")
            .with_table(
                ["Current Version", "Target Version"],
                [[cversion.to_string(), tversion.to_string()]],
            )?
            .with_recommended_action("Choose a target version newer than the current version."));
    }

    // Switches trailing the controllers by a major release cannot jump straight to the target.
    if let Some(sw) = &inputs.sw_cversion {
        if sw.major() + 1 < tversion.major() {
            return Ok(CheckResult::new(
                ResultStatus::FailUpgrade,
                "Switches are too far behind the target version",
            )
            .with_table(
                ["Lowest Switch Version", "Target Version"],
                [[sw.to_string(), tversion.to_string()]],
            )?
            .with_recommended_action("Upgrade switches to an intermediate release first."));
        }
    }

    Ok(CheckResult::pass())
}

/// All switches should run the same version before an upgrade.
pub fn switch_version_check(inputs: &CheckInputs) -> Result<CheckResult, CheckError> {
    let firmware = fabric_objects(inputs, SWITCH_FIRMWARE)?;

    let mut rows = Vec::new();
    let mut unparsed = Vec::new();
    let mut versions = BTreeSet::new();

    for object in firmware.iter() {
        let dn = attribute(object, "dn").unwrap_or_default();
        let parsed = attribute(object, "version").and_then(|raw| raw.parse::<FabricVersion>().ok());
        match (node_id_from_dn(dn), parsed) {
            (Some(node), Some(version)) => {
                rows.push([node.to_string(), version.to_string()]);
                versions.insert(version);
            }
            _ => unparsed.push([object.to_string()]),
        }
    }
    debug!(switches = rows.len(), distinct = versions.len(), "switch versions");

    if versions.len() <= 1 && unparsed.is_empty() {
        return Ok(CheckResult::pass());
    }

    let message = if versions.len() > 1 {
        format!("Switches run {} different versions", versions.len())
    } else {
        "Some switch versions could not be read".to_string()
    };

    Ok(CheckResult::new(ResultStatus::ManualReview, message)
        .with_table(["Node ID", "Version"], rows)?
        .with_unformatted_table(["Raw Object"], unparsed)?
        .with_recommended_action("Bring every switch to the same version before upgrading."))
}
