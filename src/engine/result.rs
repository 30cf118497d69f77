//! Check result value type.
//!
//! Every check routine produces exactly one [`CheckResult`]. Tables attached
//! to a result are validated when they are built, so any `CheckResult` that
//! exists satisfies the row/column invariant.

use crate::platform::PlatformError;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, TryReserveError};
use std::fmt;
use thiserror::Error;

/// Verdict of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    #[serde(alias = "PASS")]
    Pass,
    /// Non-fatal for the upgrade itself but risks an outage
    #[serde(alias = "FAIL - OUTAGE WARNING!!")]
    FailOutage,
    /// Will break the upgrade
    #[serde(alias = "FAIL - UPGRADE FAILURE!!")]
    FailUpgrade,
    #[serde(alias = "MANUAL CHECK REQUIRED")]
    ManualReview,
    #[serde(alias = "POST UPGRADE CHECK REQUIRED")]
    PostUpgradeAction,
    #[serde(alias = "N/A")]
    NotApplicable,
    #[serde(alias = "ERROR !!")]
    Error,
}

impl ResultStatus {
    /// All statuses in report order.
    pub const ALL: [ResultStatus; 7] = [
        ResultStatus::Pass,
        ResultStatus::FailOutage,
        ResultStatus::FailUpgrade,
        ResultStatus::ManualReview,
        ResultStatus::PostUpgradeAction,
        ResultStatus::NotApplicable,
        ResultStatus::Error,
    ];

    /// Human-readable label used in reports and as the record's fail type.
    pub fn label(self) -> &'static str {
        match self {
            ResultStatus::Pass => "PASS",
            ResultStatus::FailOutage => "FAIL - OUTAGE WARNING!!",
            ResultStatus::FailUpgrade => "FAIL - UPGRADE FAILURE!!",
            ResultStatus::ManualReview => "MANUAL CHECK REQUIRED",
            ResultStatus::PostUpgradeAction => "POST UPGRADE CHECK REQUIRED",
            ResultStatus::NotApplicable => "N/A",
            ResultStatus::Error => "ERROR !!",
        }
    }

    /// Coarse pass/fail projection written to the persisted record.
    pub fn rule_status(self) -> RuleStatus {
        match self {
            ResultStatus::Pass | ResultStatus::NotApplicable => RuleStatus::Pass,
            ResultStatus::FailOutage
            | ResultStatus::FailUpgrade
            | ResultStatus::ManualReview
            | ResultStatus::PostUpgradeAction
            | ResultStatus::Error => RuleStatus::Fail,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ResultStatus::Pass | ResultStatus::NotApplicable => Severity::Informational,
            ResultStatus::ManualReview => Severity::Warning,
            ResultStatus::Error => Severity::Major,
            ResultStatus::FailUpgrade | ResultStatus::FailOutage => Severity::Critical,
            ResultStatus::PostUpgradeAction => Severity::Informational,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleStatus {
    InProgress,
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Warning,
    Major,
    Critical,
}

/// A result table that cannot be persisted as header-keyed rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("row {row} has {found} values but the table has {expected} headers")]
    RowLength { row: usize, found: usize, expected: usize },
    #[error("header \"{header}\" appears more than once")]
    DuplicateHeader { header: String },
}

/// Ordered column headers plus rows of stringified values.
///
/// # Invariants
/// - Header names are unique.
/// - Every row has exactly `headers.len()` values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, rejecting any row whose length differs from the headers.
    pub fn new<H, S, R, C, V>(headers: H, rows: R) -> Result<Self, TableError>
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = V>,
        V: ToString,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|value| value.to_string()).collect())
            .collect();
        Self::from_parts(headers, rows)
    }

    pub(crate) fn from_parts(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        let table = Table { headers, rows };
        table.validate()?;
        Ok(table)
    }

    /// Re-check the header and row/column invariants.
    pub fn validate(&self) -> Result<(), TableError> {
        let mut seen = HashSet::new();
        if let Some(header) = self.headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(TableError::DuplicateHeader { header: header.clone() });
        }

        let expected = self.headers.len();
        match self.rows.iter().position(|row| row.len() != expected) {
            Some(row) => Err(TableError::RowLength {
                row,
                found: self.rows[row].len(),
                expected,
            }),
            None => Ok(()),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of one check.
///
/// Built once by the check routine and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    status: ResultStatus,
    message: String,
    table: Table,
    unformatted: Table,
    recommended_action: String,
    doc_url: String,
}

impl CheckResult {
    pub fn new(status: ResultStatus, message: impl Into<String>) -> Self {
        CheckResult {
            status,
            message: message.into(),
            table: Table::default(),
            unformatted: Table::default(),
            recommended_action: String::new(),
            doc_url: String::new(),
        }
    }

    pub fn pass() -> Self {
        Self::new(ResultStatus::Pass, "")
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResultStatus::Error, message)
    }

    /// Attach the primary table.
    pub fn with_table<H, S, R, C, V>(mut self, headers: H, rows: R) -> Result<Self, TableError>
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = V>,
        V: ToString,
    {
        self.table = Table::new(headers, rows)?;
        Ok(self)
    }

    /// Attach the secondary table for data that could not be parsed into the
    /// primary schema.
    pub fn with_unformatted_table<H, S, R, C, V>(mut self, headers: H, rows: R) -> Result<Self, TableError>
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = V>,
        V: ToString,
    {
        self.unformatted = Table::new(headers, rows)?;
        Ok(self)
    }

    pub(crate) fn with_tables(mut self, table: Table, unformatted: Table) -> Self {
        self.table = table;
        self.unformatted = unformatted;
        self
    }

    pub fn with_recommended_action(mut self, action: impl Into<String>) -> Self {
        self.recommended_action = action.into();
        self
    }

    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = url.into();
        self
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn unformatted_table(&self) -> &Table {
        &self.unformatted
    }

    pub fn recommended_action(&self) -> &str {
        &self.recommended_action
    }

    pub fn doc_url(&self) -> &str {
        &self.doc_url
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

/// Failure raised by a check routine.
///
/// The execution wrapper converts every variant into an ERROR result for
/// that check alone.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Unexpected(String),
    /// An allocation the routine attempted could not be satisfied
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl CheckError {
    pub fn unexpected(message: impl fmt::Display) -> Self {
        CheckError::Unexpected(message.to_string())
    }
}

impl From<TryReserveError> for CheckError {
    fn from(_: TryReserveError) -> Self {
        CheckError::OutOfMemory
    }
}
