//! Durable per-check result store.
//!
//! Each check identity owns one JSON file under the results directory. The
//! file is created with an in-progress record before any check runs and is
//! rewritten once when the check finalizes. Writes go to a temporary file
//! that is renamed over the target, so a reader never sees a partial record.
//!
//! Records for different checks share nothing on disk. The in-memory result
//! and title maps are shared by every worker and sit behind one mutex.

use crate::engine::record::CheckRecord;
use crate::engine::result::CheckResult;
use crate::engine::summary::ResultSummary;
use crate::PreflightError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    titles: HashMap<String, String>,
    results: HashMap<String, CheckResult>,
}

/// Result store rooted at one directory.
#[derive(Debug)]
pub struct ResultStore {
    dir: PathBuf,
    state: Mutex<StoreState>,
}

impl ResultStore {
    /// Open (creating if needed) the results directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PreflightError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PreflightError::Io {
            context: "open result store".to_string(),
            path: dir.clone(),
            source,
        })?;
        Ok(ResultStore {
            dir,
            state: Mutex::new(StoreState::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for a check identity.
    pub fn record_path(&self, check_id: &str) -> PathBuf {
        self.dir.join(record_file_name(check_id))
    }

    /// Write the in-progress placeholder and remember the check's title.
    pub fn init_result(&self, check_id: &str, title: &str) -> Result<(), PreflightError> {
        self.lock().titles.insert(check_id.to_string(), title.to_string());
        self.write_record(&CheckRecord::in_progress(check_id, title))
    }

    /// Remember a title without touching the record file.
    ///
    /// Returns `false` when a title was already registered.
    pub fn ensure_title(&self, check_id: &str, title: &str) -> bool {
        let mut state = self.lock();
        if state.titles.contains_key(check_id) {
            return false;
        }
        state.titles.insert(check_id.to_string(), title.to_string());
        true
    }

    /// Persist the final result of a check, fully replacing its record.
    ///
    /// The in-memory result only changes once the record is on disk.
    pub fn update_result(&self, check_id: &str, result: CheckResult) -> Result<(), PreflightError> {
        let title = self.get_title(check_id).unwrap_or_else(|| check_id.to_string());
        let record = CheckRecord::from_result(check_id, &title, &result).map_err(|source| {
            PreflightError::InvalidTable {
                check_id: check_id.to_string(),
                source,
            }
        })?;
        self.write_record(&record)?;

        debug!(check_id = %check_id, status = %result.status(), "result stored");
        self.lock().results.insert(check_id.to_string(), result);
        Ok(())
    }

    /// Last finalized result for a check, if any.
    pub fn get_result(&self, check_id: &str) -> Option<CheckResult> {
        self.lock().results.get(check_id).cloned()
    }

    pub fn get_title(&self, check_id: &str) -> Option<String> {
        self.lock().titles.get(check_id).cloned()
    }

    /// Counts over finalized results only.
    pub fn get_summary(&self) -> ResultSummary {
        let state = self.lock();
        let mut summary = ResultSummary::new();
        for result in state.results.values() {
            summary.record(result.status());
        }
        summary
    }

    /// Read a record back from disk.
    pub fn load_record(&self, check_id: &str) -> Result<CheckRecord, PreflightError> {
        let path = self.record_path(check_id);
        let bytes = fs::read(&path).map_err(|source| PreflightError::Io {
            context: "load check record".to_string(),
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| PreflightError::Serialization {
            context: format!("decode record {}", path.display()),
            source,
        })
    }

    fn write_record(&self, record: &CheckRecord) -> Result<(), PreflightError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|source| PreflightError::Serialization {
            context: format!("encode record {}", record.rule_id),
            source,
        })?;
        write_atomic(&self.record_path(&record.rule_id), &bytes)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A poisoned map still holds every completed insert.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// File name for a check identity.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, so two identities can
/// map to the same name; the check manager rejects such collisions.
pub fn record_file_name(check_id: &str) -> String {
    let stem: String = check_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.json", stem)
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PreflightError> {
    let io_err = |context: &str, path: &Path, source| PreflightError::Io {
        context: context.to_string(),
        path: path.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, bytes).map_err(|e| io_err("write temp record", &tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err("replace record", path, e));
    }
    Ok(())
}
