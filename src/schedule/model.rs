//! Schedule types and validation.

use crate::error::{CurfewError, Result};
use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TIME_OF_DAY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("Invalid time-of-day regex"));

/// Which days a schedule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    /// Monday through Friday.
    Weekdays,
    /// The configured weekend days.
    Weekends,
    /// The schedule's own `days` set.
    Custom,
}

/// A stored schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub recurrence: Recurrence,

    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,

    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,

    /// Days for `custom` schedules (0=Sun ... 6=Sat).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<u8>>,

    pub enabled: bool,
}

/// A schedule as submitted by `schedule-add`, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchedule {
    pub name: String,

    #[serde(rename = "type")]
    pub recurrence: Recurrence,

    pub start_time: String,

    pub end_time: String,

    #[serde(default)]
    pub days: Option<Vec<u8>>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewSchedule {
    /// Validate and assign an id.
    pub fn into_schedule(self, id: String) -> Result<Schedule> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(invalid("name must not be empty"));
        }

        let start_time = parse_time_of_day("startTime", &self.start_time)?;
        let end_time = parse_time_of_day("endTime", &self.end_time)?;

        if let Some(days) = &self.days
            && let Some(bad) = days.iter().find(|d| **d > 6)
        {
            return Err(invalid(&format!(
                "days must be between 0 (Sunday) and 6 (Saturday), got {}",
                bad
            )));
        }

        if self.recurrence == Recurrence::Custom
            && self.days.as_ref().is_none_or(|days| days.is_empty())
        {
            return Err(invalid("custom schedules need at least one day"));
        }

        Ok(Schedule {
            id,
            name,
            recurrence: self.recurrence,
            start_time,
            end_time,
            days: self.days,
            enabled: self.enabled,
        })
    }
}

fn invalid(msg: &str) -> CurfewError {
    CurfewError::InvalidRequest(format!("invalid schedule: {}", msg))
}

fn parse_time_of_day(field: &str, value: &str) -> Result<NaiveTime> {
    if !TIME_OF_DAY_REGEX.is_match(value) {
        return Err(invalid(&format!("{} must be HH:MM, got '{}'", field, value)));
    }
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| invalid(&format!("{} is not a valid time: '{}'", field, value)))
}

/// `HH:MM` (de)serialization for times of day.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom)
    }
}
