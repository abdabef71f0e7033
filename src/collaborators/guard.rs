//! Enforcement guards.

use super::EnforcementGuard;
use crate::error::{CurfewError, Result};
use crate::fs::atomic_write_file;
use chrono::Utc;
use std::path::PathBuf;
use tracing::debug;

/// Guard that does nothing; the lock record is the only signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGuard;

impl EnforcementGuard for NoopGuard {
    fn install_enforcement(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn remove_enforcement(&self) -> Result<()> {
        Ok(())
    }
}

/// Guard that maintains a marker file while enforcement is active.
///
/// A wrapper around the guarded tool refuses to run while the marker
/// exists. The marker holds the RFC3339 time enforcement was applied.
///
/// It interrupts nothing that is already running, so it never reports
/// handoff keys.
#[derive(Debug, Clone)]
pub struct MarkerGuard {
    path: PathBuf,
}

impl MarkerGuard {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl EnforcementGuard for MarkerGuard {
    fn install_enforcement(&self) -> Result<Vec<String>> {
        atomic_write_file(&self.path, &format!("{}\n", Utc::now().to_rfc3339()))
            .map_err(|e| CurfewError::ExternalFailure(format!("failed to install enforcement: {}", e)))?;
        debug!(path = %self.path.display(), "enforcement marker written");
        Ok(Vec::new())
    }

    fn remove_enforcement(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "enforcement marker removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CurfewError::ExternalFailure(format!(
                "failed to remove enforcement marker '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn marker_install_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let marker = temp_dir.path().join("enforced");
        let guard = MarkerGuard::new(&marker);

        assert!(!marker.exists());
        assert!(guard.install_enforcement().unwrap().is_empty());
        assert!(marker.exists());

        guard.remove_enforcement().unwrap();
        assert!(!marker.exists());
    }

    #[test]
    fn removing_absent_marker_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let guard = MarkerGuard::new(temp_dir.path().join("enforced"));
        guard.remove_enforcement().unwrap();
    }

    #[test]
    fn install_failure_is_external() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let guard = MarkerGuard::new(blocker.join("enforced"));
        let err = guard.install_enforcement().unwrap_err();
        assert!(matches!(err, CurfewError::ExternalFailure(_)));
    }

    #[test]
    fn noop_guard_never_fails() {
        assert!(NoopGuard.install_enforcement().unwrap().is_empty());
        NoopGuard.remove_enforcement().unwrap();
    }
}
