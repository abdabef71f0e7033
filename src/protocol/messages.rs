//! Request and response messages.

use crate::challenge::Challenge;
use crate::config::Config;
use crate::engine::PaymentOption;
use crate::events::{DayStats, ResetScope};
use crate::record::LockRecord;
use crate::schedule::{NewSchedule, Schedule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Window for `stats` when given as a named period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    Week,
    Month,
}

impl StatsPeriod {
    pub fn days(self) -> u32 {
        match self {
            StatsPeriod::Day => 1,
            StatsPeriod::Week => 7,
            StatsPeriod::Month => 30,
        }
    }
}

/// Inbound request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Request {
    Status,

    Lock {
        duration_minutes: f64,
        #[serde(default)]
        hard_lock: bool,
    },

    Unlock,

    BypassStart,

    BypassComplete {
        #[serde(default)]
        challenge_id: Option<String>,
        #[serde(default, alias = "answer")]
        proof: Option<String>,
        /// `true` when paying instead of solving challenges.
        #[serde(default)]
        payment_method: bool,
        #[serde(default, alias = "stripePaymentIntentId")]
        payment_ref: Option<String>,
    },

    ScheduleList,

    ScheduleAdd {
        schedule: NewSchedule,
    },

    ScheduleRemove {
        id: String,
    },

    ScheduleToggle {
        id: String,
        enabled: bool,
    },

    ConfigGet,

    ConfigSet {
        key: String,
        value: Value,
    },

    Stats {
        #[serde(default)]
        days: Option<u32>,
        #[serde(default)]
        period: Option<StatsPeriod>,
    },

    /// Clear today's bypass history, or all of it with `all`.
    StatsReset {
        #[serde(default)]
        all: bool,
    },

    HandoffClear,
}

/// Outbound response. Optional fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Response {
    Status {
        lock: LockRecord,
        config: Config,
    },

    Lock {
        ok: bool,
        lock: LockRecord,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Unlock {
        ok: bool,
        lock: LockRecord,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    BypassStart {
        ok: bool,
        challenge_id: String,
        challenges: Vec<Challenge>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        payment_option: Option<PaymentOption>,
    },

    BypassComplete {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        grace_expires_at: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    ScheduleList {
        schedules: Vec<Schedule>,
    },

    ScheduleAdd {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        schedule: Option<Schedule>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    ScheduleRemove {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    ScheduleToggle {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    ConfigGet {
        config: Config,
    },

    ConfigSet {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Stats {
        days: Vec<DayStats>,
    },

    StatsReset {
        ok: bool,
        cleared: ResetScope,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    HandoffClear {
        ok: bool,
        keys: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Error {
        message: String,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    /// Serialize to a single line (no trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "message": format!("failed to encode response: {}", e) })
                .to_string()
        })
    }
}
