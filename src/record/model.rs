//! Lock record structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three states of the lock engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    /// No lock in effect (rest state).
    #[default]
    Unlocked,
    /// Lock engaged; direct unlock is refused.
    Locked,
    /// Temporary reprieve inside an unexpired lock period.
    Grace,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStatus::Unlocked => write!(f, "unlocked"),
            LockStatus::Locked => write!(f, "locked"),
            LockStatus::Grace => write!(f, "grace"),
        }
    }
}

/// Snapshot of the lock state, as persisted and as returned by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LockRecord {
    pub status: LockStatus,

    pub locked_at: Option<DateTime<Utc>>,

    pub expires_at: Option<DateTime<Utc>>,

    pub bypass_attempts: u32,

    pub grace_expires_at: Option<DateTime<Utc>>,

    /// Schedule that engaged the current lock; `None` for manual locks.
    pub source_id: Option<String>,

    pub hard_lock: bool,

    pub pending_handoff_keys: Vec<String>,
}

impl LockRecord {
    /// The rest state, carrying forward any handoff keys still awaiting
    /// follow-up.
    pub fn unlocked_with_keys(keys: Vec<String>) -> Self {
        Self {
            pending_handoff_keys: keys,
            ..Self::default()
        }
    }

    /// Whether bypass is possible at all for this lock period.
    pub fn bypassable(&self) -> bool {
        !self.hard_lock
    }

    /// Time left in the lock period, if one is running.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match self.status {
            LockStatus::Unlocked => None,
            LockStatus::Locked | LockStatus::Grace => self
                .expires_at
                .map(|at| at - now)
                .filter(|left| *left > chrono::Duration::zero()),
        }
    }

    /// Add keys not already pending, preserving order.
    pub fn merge_handoff_keys<I: IntoIterator<Item = String>>(&mut self, keys: I) {
        for key in keys {
            if !self.pending_handoff_keys.contains(&key) {
                self.pending_handoff_keys.push(key);
            }
        }
    }
}
