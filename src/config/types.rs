//! Configuration types and defaults for curfew.

use serde::{Deserialize, Serialize};

/// How lock enforcement is applied while a lock is engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Maintain an `enforced` marker file that the tool wrapper checks (default).
    #[default]
    Marker,
    /// No enforcement side effects; the lock record is the only signal.
    #[serde(rename = "none")]
    Off,
}

/// Placeholder shown instead of secrets in responses.
pub const REDACTED: &str = "(configured)";

// Default value functions for serde
pub(crate) fn default_grace_minutes() -> u32 {
    5
}
pub(crate) fn default_weekend_days() -> Vec<u8> {
    vec![0, 6]
}
pub(crate) fn default_bypass_cooldowns() -> Vec<u64> {
    vec![60, 120, 180, 300, 600]
}
pub(crate) fn default_justification_min_words() -> u32 {
    50
}
pub(crate) fn default_payment_amount() -> u32 {
    500
}
pub(crate) fn default_payment_currency() -> String {
    "USD".to_string()
}
pub(crate) fn default_payment_verify_timeout_ms() -> u64 {
    10_000
}
pub(crate) fn default_schedule_tick_seconds() -> u64 {
    30
}
pub(crate) fn default_schedule_warning_minutes() -> u32 {
    5
}
pub(crate) fn default_true() -> bool {
    true
}
