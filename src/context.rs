//! Daemon home and file layout resolution for curfew.
//!
//! Every file the daemon owns lives under one home directory:
//!
//! ```text
//! <home>/
//!   config.yaml     typed configuration
//!   state.json      the persisted lock record
//!   schedules.json  recurring lock windows
//!   events.ndjson   append-only bypass journal
//!   daemon.pid      pid of the running daemon
//!   enforced        enforcement marker (present while locked)
//!   curfew.sock     IPC socket (Unix, unless overridden)
//! ```

use crate::config::Config;
use crate::error::{CurfewError, Result};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the home directory.
pub const HOME_ENV: &str = "CURFEW_HOME";

/// Home directory name under the user's home.
pub const DEFAULT_HOME_DIR: &str = ".curfew";

/// Named pipe used on Windows when no socket path is configured.
pub const DEFAULT_PIPE_NAME: &str = r"\\.\pipe\curfew";

/// Resolved paths for the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonContext {
    /// Absolute path to the daemon home directory.
    pub home: PathBuf,
}

impl DaemonContext {
    /// Context rooted at an explicit directory.
    pub fn at<P: Into<PathBuf>>(home: P) -> Self {
        Self { home: home.into() }
    }

    /// Resolve the home directory from an explicit override or the process
    /// environment.
    pub fn resolve(home_override: Option<&Path>) -> Result<Self> {
        Self::resolve_with(home_override, |key| std::env::var(key).ok())
    }

    /// Resolve using a custom environment lookup.
    ///
    /// Priority:
    /// 1. `home_override`
    /// 2. `$CURFEW_HOME`
    /// 3. `$HOME/.curfew` (`%USERPROFILE%\.curfew` on Windows)
    pub fn resolve_with<F>(home_override: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(home) = home_override {
            return Ok(Self::at(home));
        }

        if let Some(home) = lookup(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::at(home));
        }

        let user_home = lookup("HOME")
            .or_else(|| lookup("USERPROFILE"))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CurfewError::DaemonError(format!(
                    "cannot determine home directory; set {} or HOME",
                    HOME_ENV
                ))
            })?;

        Ok(Self::at(PathBuf::from(user_home).join(DEFAULT_HOME_DIR)))
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.yaml")
    }

    pub fn state_path(&self) -> PathBuf {
        self.home.join("state.json")
    }

    pub fn schedules_path(&self) -> PathBuf {
        self.home.join("schedules.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.home.join("events.ndjson")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.home.join("daemon.pid")
    }

    pub fn marker_path(&self) -> PathBuf {
        self.home.join("enforced")
    }

    /// IPC endpoint: the configured override, else the platform default.
    pub fn socket_path(&self, config: &Config) -> PathBuf {
        if let Some(path) = config.socket_path.as_deref().filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }

        if cfg!(windows) {
            PathBuf::from(DEFAULT_PIPE_NAME)
        } else {
            self.home.join("curfew.sock")
        }
    }
}
