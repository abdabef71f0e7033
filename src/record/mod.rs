//! The persisted lock record.
//!
//! There is exactly one mutable record per machine. It is loaded at daemon
//! start and rewritten (atomically) on every mutation, always before the
//! in-memory copy changes.
//!
//! # Record Format
//!
//! `state.json` holds the same camelCase JSON that `status` returns:
//! - `status`: `unlocked` | `locked` | `grace`
//! - `lockedAt` / `expiresAt`: RFC3339, both set while a lock period runs
//! - `bypassAttempts`: attempts since the current lock engaged
//! - `graceExpiresAt`: set only while in grace
//! - `sourceId`: schedule that engaged the lock, absent for manual locks
//! - `hardLock`: no bypass path for this lock period
//! - `pendingHandoffKeys`: work interrupted by the lock, kept for follow-up

mod model;
mod store;

#[cfg(test)]
mod tests;

pub use model::{LockRecord, LockStatus};
pub use store::StateStore;
