//! Durable storage for the lock record.

use super::model::LockRecord;
use crate::error::{CurfewError, Result};
use crate::fs::atomic_write_file;
use std::path::{Path, PathBuf};

/// Reads and atomically rewrites `state.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record.
    ///
    /// Returns `Ok(None)` when no record has been written yet. A record that
    /// exists but cannot be read or parsed is an error; the caller decides
    /// whether to fall back to the default.
    pub fn load(&self) -> Result<Option<LockRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            CurfewError::PersistenceFailure(format!(
                "failed to read lock record '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map(Some).map_err(|e| {
            CurfewError::PersistenceFailure(format!(
                "failed to parse lock record '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Atomically replace the persisted record.
    pub fn save(&self, record: &LockRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            CurfewError::PersistenceFailure(format!("failed to serialize lock record: {}", e))
        })?;
        atomic_write_file(&self.path, &json)
    }
}
