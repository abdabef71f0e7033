//! Error types for curfew.
//!
//! Uses thiserror for derive macros. The variants follow the daemon's error
//! taxonomy: everything except `PersistenceFailure` and `DaemonError` is a
//! per-request rejection that leaves engine state untouched.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for curfew operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurfewError {
    /// Malformed or unknown request. The connection stays open.
    #[error("{0}")]
    InvalidRequest(String),

    /// The request is well-formed but not permitted in the current state.
    #[error("{0}")]
    InvalidOperation(String),

    /// Unknown or already-consumed bypass challenge session.
    #[error("{0}")]
    ExpiredSession(String),

    /// A collaborator (payment verifier, enforcement guard, store) failed.
    #[error("{0}")]
    ExternalFailure(String),

    /// The lock record could not be written; in-memory state was not changed.
    #[error("failed to persist lock state: {0}")]
    PersistenceFailure(String),

    /// Daemon startup or IPC endpoint failure.
    #[error("daemon error: {0}")]
    DaemonError(String),
}

impl CurfewError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CurfewError::InvalidRequest(_)
            | CurfewError::InvalidOperation(_)
            | CurfewError::ExpiredSession(_) => exit_codes::USER_ERROR,
            CurfewError::ExternalFailure(_) => exit_codes::EXTERNAL_FAILURE,
            CurfewError::PersistenceFailure(_) => exit_codes::PERSISTENCE_FAILURE,
            CurfewError::DaemonError(_) => exit_codes::DAEMON_FAILURE,
        }
    }
}

/// Result type alias for curfew operations.
pub type Result<T> = std::result::Result<T, CurfewError>;
