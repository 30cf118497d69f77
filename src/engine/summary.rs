//! Result summary statistics.

use crate::engine::result::{ResultStatus, RuleStatus};
use std::collections::BTreeMap;

/// Count of finalized results per status.
///
/// Only finalized results are counted; a check still in progress (or one
/// that never ran because the run aborted) is not part of `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSummary {
    counts: BTreeMap<ResultStatus, usize>,
    pub total: usize,
}

impl ResultSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finalized result
    pub fn record(&mut self, status: ResultStatus) {
        *self.counts.entry(status).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn count(&self, status: ResultStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Results whose coarse status is pass
    pub fn passed(&self) -> usize {
        self.coarse(RuleStatus::Pass)
    }

    /// Results whose coarse status is fail
    pub fn failed(&self) -> usize {
        self.coarse(RuleStatus::Fail)
    }

    fn coarse(&self, rule_status: RuleStatus) -> usize {
        self.counts
            .iter()
            .filter(|(status, _)| status.rule_status() == rule_status)
            .map(|(_, count)| count)
            .sum()
    }

    /// Bucket view keyed by status label, plus `TOTAL`.
    ///
    /// Every status is present, with zero when nothing landed in it.
    pub fn to_map(&self) -> BTreeMap<String, usize> {
        let mut map: BTreeMap<String, usize> = ResultStatus::ALL
            .iter()
            .map(|status| (status.label().to_string(), self.count(*status)))
            .collect();
        map.insert("TOTAL".to_string(), self.total);
        map
    }
}
