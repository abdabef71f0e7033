//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for the curfew daemon.
///
/// Optional fields are serialized as explicit `null` so that every key is
/// addressable by `config-set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Bypass settings
    // =========================================================================
    /// Minutes of reprieve granted after a completed bypass.
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: u32,

    /// Whether challenge-based bypass is offered.
    #[serde(default = "default_true")]
    pub challenge_bypass_enabled: bool,

    /// Mandatory cooldown seconds per bypass attempt (index = attempt - 1).
    /// Attempts beyond the table use the last entry.
    #[serde(default = "default_bypass_cooldowns")]
    pub bypass_cooldowns: Vec<u64>,

    /// Minimum word count for the justification challenge.
    #[serde(default = "default_justification_min_words")]
    pub justification_min_words: u32,

    // =========================================================================
    // Payment bypass settings
    // =========================================================================
    /// Whether a payment-based bypass is offered.
    #[serde(default)]
    pub payment_bypass_enabled: bool,

    /// Payment amount in cents.
    #[serde(default = "default_payment_amount")]
    pub payment_bypass_amount: u32,

    /// ISO currency code for the payment amount.
    #[serde(default = "default_payment_currency")]
    pub payment_bypass_currency: String,

    /// Where the user pays (payment link, tip jar, etc.).
    #[serde(default)]
    pub payment_bypass_url: String,

    /// Stripe secret key. When set, payments are verified server-side.
    #[serde(default)]
    pub payment_bypass_stripe_key: Option<String>,

    /// Network timeout for payment verification.
    #[serde(default = "default_payment_verify_timeout_ms")]
    pub payment_verify_timeout_ms: u64,

    // =========================================================================
    // Schedule settings
    // =========================================================================
    /// Days counted as weekend for `weekends` schedules (0=Sun … 6=Sat).
    #[serde(default = "default_weekend_days")]
    pub weekend_days: Vec<u8>,

    /// Seconds between schedule evaluations.
    #[serde(default = "default_schedule_tick_seconds")]
    pub schedule_tick_seconds: u64,

    /// Minutes before a schedule starts at which a warning is sent.
    #[serde(default = "default_schedule_warning_minutes")]
    pub schedule_warning_minutes: u32,

    // =========================================================================
    // Integration settings (read at daemon start)
    // =========================================================================
    /// Enforcement side effect applied while locked.
    #[serde(default)]
    pub enforcement: EnforcementMode,

    /// Notification command template, e.g. `notify-send {title} {body}`.
    /// When unset, notifications are only logged.
    #[serde(default)]
    pub notify_command: Option<String>,

    /// Overrides the default IPC endpoint.
    #[serde(default)]
    pub socket_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grace_minutes: default_grace_minutes(),
            challenge_bypass_enabled: default_true(),
            bypass_cooldowns: default_bypass_cooldowns(),
            justification_min_words: default_justification_min_words(),
            payment_bypass_enabled: false,
            payment_bypass_amount: default_payment_amount(),
            payment_bypass_currency: default_payment_currency(),
            payment_bypass_url: String::new(),
            payment_bypass_stripe_key: None,
            payment_verify_timeout_ms: default_payment_verify_timeout_ms(),
            weekend_days: default_weekend_days(),
            schedule_tick_seconds: default_schedule_tick_seconds(),
            schedule_warning_minutes: default_schedule_warning_minutes(),
            enforcement: EnforcementMode::default(),
            notify_command: None,
            socket_path: None,
        }
    }
}
