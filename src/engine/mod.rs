//! The lock engine.
//!
//! [`LockEngine`] owns the lock record, the expiry and grace timers, and the
//! ledger of pending bypass sessions. It is plain synchronous code driven by
//! an injected [`Clock`]; the daemon shares it behind an [`EngineHandle`].
//!
//! # States
//!
//! ```text
//!            lock()                     bypass completed
//! Unlocked ---------> Locked ------------------------------> Grace
//!    ^                  |  ^                                   |
//!    |   expiry timer   |  |  grace timer, expiresAt future    |
//!    +------------------+  +-----------------------------------+
//!    ^                                                         |
//!    |            grace timer, expiresAt passed                |
//!    +---------------------------------------------------------+
//! ```
//!
//! Any `lock()` call re-engages from scratch regardless of state.
//!
//! Every read first applies overdue timer transitions (lazy correction), so
//! a reader never observes a state the timers would already have left.
//! Timer firing and lazy correction run the same transition functions.
//!
//! Mutations are persisted before they take effect in memory: when the
//! record cannot be written, the operation fails and nothing changes.

mod bypass;
mod handle;
mod transitions;


pub use bypass::{BypassStart, PaymentCheck, PaymentOption};
pub use handle::{BypassCompletion, EngineHandle};

use crate::challenge::Challenge;
use crate::clock::Clock;
use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::error::{CurfewError, Result};
use crate::record::{LockRecord, LockStatus, StateStore};
use crate::timer::{TimerKind, Timers};
use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Longest lock a single request may ask for (one year).
pub const MAX_LOCK_MINUTES: f64 = 525_600.0;

/// Title used for every notification the engine raises.
pub const NOTIFY_TITLE: &str = "curfew";

/// Engine-relevant slice of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub grace: Duration,
    pub challenge_bypass_enabled: bool,
    pub bypass_cooldowns: Vec<u64>,
    pub justification_min_words: u32,
    /// Present only when payment bypass is enabled.
    pub payment: Option<PaymentSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSettings {
    pub amount: u32,
    pub currency: String,
    pub url: String,
    /// Provider secret; enables server-side verification.
    pub secret_key: Option<String>,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        let payment = config.payment_bypass_enabled.then(|| PaymentSettings {
            amount: config.payment_bypass_amount,
            currency: config.payment_bypass_currency.clone(),
            url: config.payment_bypass_url.clone(),
            secret_key: config
                .payment_bypass_stripe_key
                .clone()
                .filter(|key| !key.is_empty()),
        });

        Self {
            grace: Duration::minutes(i64::from(config.grace_minutes)),
            challenge_bypass_enabled: config.challenge_bypass_enabled,
            bypass_cooldowns: config.bypass_cooldowns.clone(),
            justification_min_words: config.justification_min_words,
            payment,
        }
    }
}

/// A bypass sequence that has been issued but not completed.
#[derive(Debug, Clone)]
pub(crate) struct PendingChallenge {
    pub(crate) challenges: Vec<Challenge>,
    pub(crate) created_at: DateTime<Utc>,
}

/// Convert a requested lock length in minutes into a duration.
///
/// Rejects non-finite, non-positive and over-long values.
pub fn duration_from_minutes(minutes: f64) -> Result<Duration> {
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(CurfewError::InvalidRequest(
            "durationMinutes must be a positive number".to_string(),
        ));
    }
    if minutes > MAX_LOCK_MINUTES {
        return Err(CurfewError::InvalidRequest(format!(
            "durationMinutes must not exceed {}",
            MAX_LOCK_MINUTES
        )));
    }
    Ok(Duration::milliseconds((minutes * 60_000.0).round() as i64))
}

/// The lock state machine.
pub struct LockEngine {
    record: LockRecord,
    store: StateStore,
    timers: Timers,
    pending: HashMap<String, PendingChallenge>,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    settings: EngineSettings,
    rng: StdRng,
}

impl LockEngine {
    /// Build an engine in the default `Unlocked` state. Call [`recover`]
    /// to adopt the persisted record.
    ///
    /// [`recover`]: LockEngine::recover
    pub fn new(
        store: StateStore,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Self {
        Self {
            record: LockRecord::default(),
            store,
            timers: Timers::default(),
            pending: HashMap::new(),
            clock,
            collaborators,
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source (deterministic challenges in tests).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Startup recovery.
    ///
    /// Loads the persisted record (an unreadable record is logged and
    /// replaced by the default), re-arms whichever timer is still running,
    /// re-applies enforcement for a running lock, and applies any transition
    /// that came due while the daemon was down.
    pub fn recover(&mut self) -> Result<LockRecord> {
        self.record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => LockRecord::default(),
            Err(e) => {
                error!(error = %e, path = %self.store.path().display(), "lock record unreadable, starting unlocked");
                LockRecord::default()
            }
        };
        self.timers.cancel_all();
        self.pending.clear();

        let now = self.clock.now();
        match self.record.status {
            LockStatus::Locked => {
                if let Some(expires_at) = self.record.expires_at.filter(|at| *at > now) {
                    self.timers.arm(TimerKind::Expiry, expires_at);
                    self.apply_enforcement();
                }
            }
            LockStatus::Grace => {
                if let Some(grace_at) = self.record.grace_expires_at.filter(|at| *at > now) {
                    self.timers.arm(TimerKind::Grace, grace_at);
                    self.lift_enforcement();
                }
            }
            LockStatus::Unlocked => self.lift_enforcement(),
        }

        self.reconcile(now)?;
        info!(status = %self.record.status, expires_at = ?self.record.expires_at, "lock state recovered");
        Ok(self.record.clone())
    }

    /// Current record after lazy correction.
    pub fn status(&mut self) -> Result<LockRecord> {
        let now = self.clock.now();
        self.reconcile(now)?;
        Ok(self.record.clone())
    }

    /// Engage a fresh lock. Always wins over whatever state came before.
    pub fn lock(
        &mut self,
        duration: Duration,
        source_id: Option<String>,
        hard_lock: bool,
    ) -> Result<LockRecord> {
        if duration <= Duration::zero() {
            return Err(CurfewError::InvalidRequest(
                "lock duration must be positive".to_string(),
            ));
        }
        let now = self.clock.now();
        self.engage(now, duration, source_id, hard_lock)
    }

    /// Direct unlock. Succeeds only when already unlocked.
    pub fn unlock(&mut self) -> Result<LockRecord> {
        let now = self.clock.now();
        self.reconcile(now)?;
        match self.record.status {
            LockStatus::Unlocked => Ok(self.record.clone()),
            LockStatus::Locked => Err(CurfewError::InvalidOperation(
                "Cannot unlock directly while locked. Complete a bypass challenge first."
                    .to_string(),
            )),
            LockStatus::Grace => Err(CurfewError::InvalidOperation(
                "Cannot unlock during a grace period. The lock re-engages when grace ends."
                    .to_string(),
            )),
        }
    }

    /// Engage a lock for an active schedule window.
    ///
    /// Returns `Ok(false)` without touching anything unless the engine is
    /// unlocked and `end` is in the future.
    pub fn lock_for_schedule(
        &mut self,
        source_id: &str,
        end: DateTime<Utc>,
        label: Option<&str>,
    ) -> Result<bool> {
        let now = self.clock.now();
        self.reconcile(now)?;
        if self.record.status != LockStatus::Unlocked || end <= now {
            return Ok(false);
        }

        self.engage(now, end - now, Some(source_id.to_string()), false)?;

        let until = end.with_timezone(&chrono::Local).format("%H:%M");
        let body = match label {
            Some(name) => format!("Locked by \"{}\" until {}", name, until),
            None => format!("Locked until {}", until),
        };
        self.collaborators.notifier.notify(NOTIFY_TITLE, &body);
        Ok(true)
    }

    /// Reject configuration and schedule changes while a lock period runs.
    pub fn ensure_mutable(&mut self, what: &str) -> Result<()> {
        let now = self.clock.now();
        self.reconcile(now)?;
        match self.record.status {
            LockStatus::Unlocked => Ok(()),
            LockStatus::Locked => Err(CurfewError::InvalidOperation(format!(
                "Cannot change {} while locked.",
                what
            ))),
            LockStatus::Grace => Err(CurfewError::InvalidOperation(format!(
                "Cannot change {} during a grace period.",
                what
            ))),
        }
    }

    /// Drain the pending handoff keys.
    pub fn clear_handoff_keys(&mut self) -> Result<Vec<String>> {
        if self.record.pending_handoff_keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut next = self.record.clone();
        let keys = std::mem::take(&mut next.pending_handoff_keys);
        self.commit(next)?;
        info!(count = keys.len(), "handoff keys cleared");
        Ok(keys)
    }

    /// Apply new settings. Running timers and sessions are unaffected.
    pub fn reconfigure(&mut self, settings: EngineSettings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Write the in-memory record to disk (shutdown).
    pub fn flush(&self) -> Result<()> {
        self.store.save(&self.record)
    }

    /// When the next timer is due, if any is armed.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Uncorrected view of the record.
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn pending_sessions(&self) -> usize {
        self.pending.len()
    }
}
