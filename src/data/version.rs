//! Controller and switch version strings.
//!
//! Controllers report versions like `5.2(7f)`; switches report the same
//! release as `15.2(7f)` or `n9000-15.2(7f)`. Switch majors are ten higher
//! than the matching controller major, so they are normalized before
//! comparing.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Offset between a switch major version and the controller major.
const SWITCH_MAJOR_OFFSET: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version string '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: &'static str,
}

/// A parsed, comparable fabric version.
#[derive(Debug, Clone)]
pub struct FabricVersion {
    raw: String,
    major: u32,
    minor: u32,
    maintenance: u32,
    patch: String,
}

impl FabricVersion {
    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn maintenance(&self) -> u32 {
        self.maintenance
    }

    pub fn patch(&self) -> &str {
        &self.patch
    }

    /// `false` when `other` does not parse.
    pub fn older_than(&self, other: impl IntoVersion) -> bool {
        other.into_version().map_or(false, |o| self < &o)
    }

    /// `false` when `other` does not parse.
    pub fn newer_than(&self, other: impl IntoVersion) -> bool {
        other.into_version().map_or(false, |o| self > &o)
    }

    /// `false` when `other` does not parse.
    pub fn same_as(&self, other: impl IntoVersion) -> bool {
        other.into_version().map_or(false, |o| self == &o)
    }

    /// Short form without the patch letter, e.g. `5.2(7)`.
    pub fn simple(&self) -> String {
        format!("{}.{}({})", self.major, self.minor, self.maintenance)
    }

    fn key(&self) -> (u32, u32, u32, &str) {
        (self.major, self.minor, self.maintenance, self.patch.as_str())
    }
}

impl FromStr for FabricVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| VersionParseError {
            input: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        let body = trimmed.rsplit('-').next().unwrap_or(trimmed);
        let normalized: String = body
            .chars()
            .filter(|c| *c != ')')
            .map(|c| if c == '(' { '.' } else { c })
            .collect();

        let mut parts = normalized.split('.');
        let major: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| fail("missing major version"))?;
        let minor: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| fail("missing minor version"))?;
        let release = parts.next().ok_or_else(|| fail("missing maintenance release"))?;
        if parts.next().is_some() {
            return Err(fail("too many components"));
        }

        let digits_end = release
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(release.len());
        let maintenance: u32 = release[..digits_end]
            .parse()
            .map_err(|_| fail("maintenance release is not a number"))?;
        let patch = release[digits_end..].to_ascii_lowercase();
        if !patch.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(fail("patch must be letters"));
        }

        let major = if major > SWITCH_MAJOR_OFFSET {
            major - SWITCH_MAJOR_OFFSET
        } else {
            major
        };

        Ok(FabricVersion {
            raw: trimmed.to_string(),
            major,
            minor,
            maintenance,
            patch,
        })
    }
}

impl fmt::Display for FabricVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for FabricVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for FabricVersion {}

impl PartialOrd for FabricVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FabricVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Patch letters sort by length first so "z" < "aa".
        let (a, b) = (self.key(), other.key());
        (a.0, a.1, a.2, a.3.len(), a.3).cmp(&(b.0, b.1, b.2, b.3.len(), b.3))
    }
}

/// Anything that can stand in for a version in comparisons.
pub trait IntoVersion {
    fn into_version(self) -> Option<FabricVersion>;
}

impl IntoVersion for &FabricVersion {
    fn into_version(self) -> Option<FabricVersion> {
        Some(self.clone())
    }
}

impl IntoVersion for &str {
    fn into_version(self) -> Option<FabricVersion> {
        self.parse().ok()
    }
}

impl IntoVersion for &String {
    fn into_version(self) -> Option<FabricVersion> {
        self.parse().ok()
    }
}
