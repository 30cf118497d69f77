//! On-disk representation of a check outcome.

use crate::engine::result::{CheckResult, RuleStatus, Severity, Table, TableError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Appended to the recommended action when only unparsed data is available.
pub const UNFORMATTED_NOTE: &str =
    "Note: some data could not be parsed into the expected format. See unformatted_data for the raw values.";

/// Persisted record for one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub name: String,
    #[serde(rename = "ruleStatus")]
    pub rule_status: RuleStatus,
    pub severity: Severity,
    pub reason: String,
    pub recommended_action: String,
    #[serde(rename = "docUrl")]
    pub doc_url: String,
    #[serde(rename = "failureDetails")]
    pub failure_details: FailureDetails,
}

/// Tables and fail type attached to a record.
///
/// Each row is an object mapping column header to the stringified value, in
/// header order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails {
    #[serde(rename = "failType")]
    pub fail_type: String,
    pub header: Vec<String>,
    pub data: Vec<Map<String, Value>>,
    pub unformatted_header: Vec<String>,
    pub unformatted_data: Vec<Map<String, Value>>,
}

impl CheckRecord {
    /// Placeholder written for every check before any worker starts.
    pub fn in_progress(check_id: &str, title: &str) -> Self {
        CheckRecord {
            rule_id: check_id.to_string(),
            name: title.to_string(),
            rule_status: RuleStatus::InProgress,
            severity: Severity::Informational,
            reason: String::new(),
            recommended_action: String::new(),
            doc_url: String::new(),
            failure_details: FailureDetails::default(),
        }
    }

    /// Project a finalized result into its record.
    pub fn from_result(check_id: &str, title: &str, result: &CheckResult) -> Result<Self, TableError> {
        let status = result.status();
        let table = result.table();
        let unformatted = result.unformatted_table();

        let mut recommended_action = result.recommended_action().to_string();
        if table.is_empty() && !unformatted.is_empty() {
            if !recommended_action.is_empty() {
                recommended_action.push('\n');
            }
            recommended_action.push_str(UNFORMATTED_NOTE);
        }

        Ok(CheckRecord {
            rule_id: check_id.to_string(),
            name: title.to_string(),
            rule_status: status.rule_status(),
            severity: status.severity(),
            reason: result.message().to_string(),
            recommended_action,
            doc_url: result.doc_url().to_string(),
            failure_details: FailureDetails {
                fail_type: status.label().to_string(),
                header: table.headers().to_vec(),
                data: row_objects(table)?,
                unformatted_header: unformatted.headers().to_vec(),
                unformatted_data: row_objects(unformatted)?,
            },
        })
    }
}

fn row_objects(table: &Table) -> Result<Vec<Map<String, Value>>, TableError> {
    table.validate()?;
    Ok(table
        .rows()
        .iter()
        .map(|row| {
            table
                .headers()
                .iter()
                .zip(row)
                .map(|(header, value)| (header.clone(), Value::String(value.clone())))
                .collect()
        })
        .collect())
}
