//! State transitions shared by requests, timers and lazy correction.

use super::{LockEngine, NOTIFY_TITLE};
use crate::error::Result;
use crate::record::{LockRecord, LockStatus};
use crate::timer::TimerKind;
use chrono::{DateTime, Duration, Local, Utc};
use tracing::{error, info, warn};

const GRACE_ENDED_BODY: &str = "Grace period ended, the tool is locked again";

impl LockEngine {
    /// Persist `next`, then adopt it. On failure memory is left as it was.
    pub(super) fn commit(&mut self, next: LockRecord) -> Result<()> {
        if let Err(e) = self.store.save(&next) {
            error!(error = %e, status = %next.status, "lock record write failed, transition aborted");
            return Err(e);
        }
        self.record = next;
        Ok(())
    }

    pub(super) fn engage(
        &mut self,
        now: DateTime<Utc>,
        duration: Duration,
        source_id: Option<String>,
        hard_lock: bool,
    ) -> Result<LockRecord> {
        let expires_at = now + duration;
        let next = LockRecord {
            status: LockStatus::Locked,
            locked_at: Some(now),
            expires_at: Some(expires_at),
            bypass_attempts: 0,
            grace_expires_at: None,
            source_id,
            hard_lock,
            pending_handoff_keys: self.record.pending_handoff_keys.clone(),
        };
        self.commit(next)?;

        self.timers.cancel_all();
        self.timers.arm(TimerKind::Expiry, expires_at);
        self.pending.clear();
        self.apply_enforcement();

        info!(
            expires_at = %expires_at,
            source_id = ?self.record.source_id,
            hard_lock,
            "lock engaged"
        );
        Ok(self.record.clone())
    }

    /// Locked or Grace -> Unlocked. Handoff keys survive.
    pub(super) fn expire(&mut self) -> Result<()> {
        let next = LockRecord::unlocked_with_keys(self.record.pending_handoff_keys.clone());
        self.commit(next)?;

        self.timers.cancel_all();
        self.pending.clear();
        self.lift_enforcement();

        info!("lock expired");
        Ok(())
    }

    /// Grace -> Locked while the lock period runs, else -> Unlocked.
    pub(super) fn end_grace(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(left) = self.record.remaining(now) else {
            return self.expire();
        };
        let expires_at = now + left;

        let mut next = self.record.clone();
        next.status = LockStatus::Locked;
        next.grace_expires_at = None;
        self.commit(next)?;

        self.timers.cancel(TimerKind::Grace);
        self.timers.arm(TimerKind::Expiry, expires_at);
        self.apply_enforcement();
        self.collaborators
            .notifier
            .notify(NOTIFY_TITLE, GRACE_ENDED_BODY);

        info!(remaining_secs = left.num_seconds(), "grace ended, lock re-engaged");
        Ok(())
    }

    /// Locked -> Grace after an accepted bypass.
    pub(super) fn grant_grace(&mut self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let grace_expires_at = now + self.settings.grace;

        let mut next = self.record.clone();
        next.status = LockStatus::Grace;
        next.grace_expires_at = Some(grace_expires_at);
        self.commit(next)?;

        self.timers.cancel(TimerKind::Expiry);
        self.timers.arm(TimerKind::Grace, grace_expires_at);
        self.lift_enforcement();

        let today = now.with_timezone(&Local).date_naive();
        if let Err(e) = self.collaborators.stats.record_bypass_event(today) {
            warn!(error = %e, "failed to record bypass event");
        }

        info!(grace_expires_at = %grace_expires_at, attempts = self.record.bypass_attempts, "bypass accepted, grace started");
        Ok(grace_expires_at)
    }

    /// The transition a timer would perform at `now`, if one is overdue.
    fn due_transition(&self, now: DateTime<Utc>) -> Option<TimerKind> {
        match self.record.status {
            LockStatus::Unlocked => None,
            LockStatus::Locked => match self.record.expires_at {
                Some(at) if at > now => None,
                _ => Some(TimerKind::Expiry),
            },
            LockStatus::Grace => match self.record.grace_expires_at {
                Some(at) if at > now => None,
                _ => Some(TimerKind::Grace),
            },
        }
    }

    /// Apply every overdue transition.
    pub(super) fn reconcile(&mut self, now: DateTime<Utc>) -> Result<()> {
        while let Some(kind) = self.due_transition(now) {
            match kind {
                TimerKind::Expiry => self.expire()?,
                TimerKind::Grace => self.end_grace(now)?,
            }
        }
        Ok(())
    }

    /// Timer callback: disarm whatever is due and run the transitions.
    pub fn fire_timers(&mut self) -> Result<Vec<TimerKind>> {
        let now = self.clock.now();
        let fired = self.timers.take_due(now);
        self.reconcile(now)?;
        Ok(fired)
    }

    /// Install enforcement, folding any interrupted-work keys into the record.
    pub(super) fn apply_enforcement(&mut self) {
        let keys = match self.collaborators.guard.install_enforcement() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to install enforcement");
                return;
            }
        };
        if keys.is_empty() {
            return;
        }

        let mut next = self.record.clone();
        next.merge_handoff_keys(keys);
        if next != self.record {
            // The lock itself is already committed; losing the keys is not fatal.
            if let Err(e) = self.commit(next) {
                warn!(error = %e, "failed to record handoff keys");
            }
        }
    }

    pub(super) fn lift_enforcement(&self) {
        if let Err(e) = self.collaborators.guard.remove_enforcement() {
            warn!(error = %e, "failed to remove enforcement");
        }
    }
}
