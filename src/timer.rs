//! Explicit timer set for lock expiry and grace expiry.
//!
//! Timers are plain deadlines owned by the engine. Nothing here sleeps: the
//! daemon's timer driver asks for [`Timers::next_deadline`], waits, and then
//! hands control back to the engine, which drains [`Timers::take_due`] and
//! runs the same transition code that lazy read correction uses.

use chrono::{DateTime, Utc};
use std::fmt;

/// The two timers the engine can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires when the lock period's `expiresAt` passes.
    Expiry,
    /// Fires when the grace period's `graceExpiresAt` passes.
    Grace,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Expiry => write!(f, "expiry"),
            TimerKind::Grace => write!(f, "grace"),
        }
    }
}

/// Armed deadlines, at most one per [`TimerKind`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Timers {
    expiry: Option<DateTime<Utc>>,
    grace: Option<DateTime<Utc>>,
}

impl Timers {
    /// Arm (or re-arm) a timer. Any previous deadline of the same kind is replaced.
    pub fn arm(&mut self, kind: TimerKind, at: DateTime<Utc>) {
        *self.slot(kind) = Some(at);
    }

    /// Cancel a timer. Cancelling an unarmed timer is a no-op.
    pub fn cancel(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }

    /// Cancel every timer.
    pub fn cancel_all(&mut self) {
        self.expiry = None;
        self.grace = None;
    }

    /// Deadline of a specific timer, if armed.
    pub fn deadline(&self, kind: TimerKind) -> Option<DateTime<Utc>> {
        match kind {
            TimerKind::Expiry => self.expiry,
            TimerKind::Grace => self.grace,
        }
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.expiry, self.grace) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Disarm and return every timer whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<TimerKind> {
        let mut due: Vec<(DateTime<Utc>, TimerKind)> = Vec::new();
        for kind in [TimerKind::Expiry, TimerKind::Grace] {
            if let Some(at) = self.deadline(kind)
                && at <= now
            {
                due.push((at, kind));
                self.cancel(kind);
            }
        }
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, kind)| kind).collect()
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<DateTime<Utc>> {
        match kind {
            TimerKind::Expiry => &mut self.expiry,
            TimerKind::Grace => &mut self.grace,
        }
    }
}
