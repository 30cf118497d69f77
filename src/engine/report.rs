//! Final report assembled after a run.

use crate::context::RunMetadata;
use crate::engine::manager::CheckManager;
use crate::engine::registry::DataSource;
use crate::engine::result::CheckResult;
use crate::engine::summary::ResultSummary;

/// One check as it ended up.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub id: String,
    pub title: String,
    pub data_source: DataSource,
    /// `None` if the check never finalized
    pub result: Option<CheckResult>,
}

/// Results of a run, in check order.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub metadata: RunMetadata,
    pub entries: Vec<ReportEntry>,
    pub summary: ResultSummary,
}

impl PreflightReport {
    pub fn from_manager(manager: &CheckManager, metadata: RunMetadata) -> Self {
        let entries = manager
            .checks()
            .iter()
            .map(|check| ReportEntry {
                id: check.id.clone(),
                title: manager
                    .get_check_title(&check.id)
                    .unwrap_or_else(|| check.title.clone()),
                data_source: check.data_source,
                result: manager.get_check_result(&check.id),
            })
            .collect();

        PreflightReport {
            metadata,
            entries,
            summary: manager.summary(),
        }
    }

    /// Entries whose result is a coarse failure.
    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| {
            e.result
                .as_ref()
                .map_or(false, |r| r.status().rule_status() == crate::RuleStatus::Fail)
        })
    }
}
