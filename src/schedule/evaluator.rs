//! Schedule evaluation.

use super::model::{Recurrence, Schedule};
use super::store::ScheduleStore;
use crate::collaborators::Notifier;
use crate::config::Config;
use crate::engine::{EngineHandle, NOTIFY_TITLE};
use crate::error::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of checking one schedule at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCheck {
    pub active: bool,
    /// End of today's window; equal to `now` when the day does not match.
    pub end: NaiveDateTime,
}

/// Whether `schedule` applies on the weekday of `date`.
fn day_matches(schedule: &Schedule, date: NaiveDate, weekend_days: &[u8]) -> bool {
    let day = date.weekday().num_days_from_sunday() as u8;
    match schedule.recurrence {
        Recurrence::Daily => true,
        Recurrence::Weekdays => (1..=5).contains(&day),
        Recurrence::Weekends => weekend_days.contains(&day),
        Recurrence::Custom => schedule
            .days
            .as_ref()
            .is_some_and(|days| days.contains(&day)),
    }
}

fn minute_of(now: NaiveDateTime) -> NaiveTime {
    NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or_default()
}

/// Check a schedule against a local wall-clock time.
pub fn check_active(schedule: &Schedule, now: NaiveDateTime, weekend_days: &[u8]) -> WindowCheck {
    let inactive = WindowCheck { active: false, end: now };
    if !schedule.enabled || !day_matches(schedule, now.date(), weekend_days) {
        return inactive;
    }

    let minute = minute_of(now);
    WindowCheck {
        active: schedule.start_time <= minute && minute < schedule.end_time,
        end: now.date().and_time(schedule.end_time),
    }
}

/// Whether the schedule starts later today within `window`.
pub fn starts_within(
    schedule: &Schedule,
    now: NaiveDateTime,
    weekend_days: &[u8],
    window: Duration,
) -> bool {
    if !schedule.enabled || !day_matches(schedule, now.date(), weekend_days) {
        return false;
    }
    let minute = minute_of(now);
    if minute >= schedule.start_time {
        return false;
    }
    schedule.start_time - minute <= window
}

/// Evaluator-relevant slice of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorSettings {
    pub weekend_days: Vec<u8>,
    pub warning: Duration,
}

impl From<&Config> for EvaluatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            weekend_days: config.weekend_days.clone(),
            warning: Duration::minutes(i64::from(config.schedule_warning_minutes)),
        }
    }
}

/// Periodic schedule scanner.
pub struct ScheduleEvaluator {
    store: Arc<dyn ScheduleStore>,
    notifier: Arc<dyn Notifier>,
    settings: EvaluatorSettings,
    warned: HashSet<(String, NaiveDate)>,
}

impl ScheduleEvaluator {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        notifier: Arc<dyn Notifier>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
            warned: HashSet::new(),
        }
    }

    pub fn reconfigure(&mut self, settings: EvaluatorSettings) {
        self.settings = settings;
    }

    /// One evaluation pass at `now` (in the user's time zone).
    ///
    /// Returns the number of schedules that engaged a lock.
    pub fn tick<Tz: TimeZone>(&mut self, engine: &EngineHandle, now: &DateTime<Tz>) -> Result<usize> {
        let schedules = self.store.list()?;
        let local = now.naive_local();
        let today = local.date();
        self.warned.retain(|(_, date)| *date == today);

        let mut engaged = 0;
        for schedule in schedules.iter().filter(|s| s.enabled) {
            let check = check_active(schedule, local, &self.settings.weekend_days);
            if check.active {
                let Some(end) = now
                    .timezone()
                    .from_local_datetime(&check.end)
                    .earliest()
                    .map(|end| end.with_timezone(&Utc))
                else {
                    warn!(id = %schedule.id, end = %check.end, "schedule end does not exist in local time");
                    continue;
                };

                if engine.with(|e| e.lock_for_schedule(&schedule.id, end, Some(&schedule.name)))? {
                    engaged += 1;
                }
                continue;
            }

            if starts_within(schedule, local, &self.settings.weekend_days, self.settings.warning)
                && self.warned.insert((schedule.id.clone(), today))
            {
                let body = format!(
                    "\"{}\" locks the tool at {}",
                    schedule.name,
                    schedule.start_time.format("%H:%M")
                );
                self.notifier.notify(NOTIFY_TITLE, &body);
                debug!(id = %schedule.id, "schedule warning sent");
            }
        }
        Ok(engaged)
    }
}
