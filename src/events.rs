//! Bypass event journal for curfew.
//!
//! Completed bypasses are appended to `<home>/events.ndjson`, one JSON object
//! per line. The journal backs the `stats` request.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: The action recorded (`bypass_completed`)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `date`: Local calendar date the event counts toward (`YYYY-MM-DD`)
//!
//! Lines that fail to parse are skipped when reading, so a torn final line
//! after a crash does not hide the rest of the history. A reset rewrites the
//! journal atomically and drops such lines for good.

use crate::collaborators::StatsSink;
use crate::error::{CurfewError, Result};
use crate::fs::atomic_write_file;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Actions that can be journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// A bypass challenge or payment was accepted (Locked -> Grace).
    BypassCompleted,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,

    pub action: EventAction,

    /// Who was at the keyboard (e.g., `user@HOST`).
    pub actor: String,

    pub date: NaiveDate,
}

impl Event {
    pub fn bypass(date: NaiveDate) -> Self {
        Self {
            ts: Utc::now(),
            action: EventAction::BypassCompleted,
            actor: get_actor_string(),
            date,
        }
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            CurfewError::ExternalFailure(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// Bypass count for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStats {
    pub date: NaiveDate,
    pub bypass_count: u32,
}

/// Which part of the history a reset clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    Today,
    All,
}

fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append-only NDJSON journal.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event and sync it to disk.
    pub fn append(&self, event: &Event) -> Result<()> {
        let json_line = event.to_ndjson_line()?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                CurfewError::ExternalFailure(format!(
                    "failed to create events directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                CurfewError::ExternalFailure(format!(
                    "failed to open events file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            CurfewError::ExternalFailure(format!(
                "failed to write event to '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            CurfewError::ExternalFailure(format!(
                "failed to sync events file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Read every parseable event. A missing journal is empty.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CurfewError::ExternalFailure(format!(
                    "failed to read events file '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut events = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed event"),
            }
        }
        Ok(events)
    }

    /// Bypass counts for the `days` calendar days ending at `end`, oldest
    /// first, including days with no bypasses.
    pub fn daily_bypass_counts(&self, end: NaiveDate, days: u32) -> Result<Vec<DayStats>> {
        let days = days.max(1);
        let start = end - Duration::days(i64::from(days) - 1);

        let mut counts: BTreeMap<NaiveDate, u32> = (0..days)
            .map(|offset| (start + Duration::days(i64::from(offset)), 0))
            .collect();

        for event in self.read_all()? {
            if event.action != EventAction::BypassCompleted {
                continue;
            }
            if let Some(count) = counts.get_mut(&event.date) {
                *count += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(date, bypass_count)| DayStats { date, bypass_count })
            .collect())
    }

    /// Drop the events of `today` (or every event) from the journal.
    ///
    /// Returns how many events were removed.
    pub fn reset(&self, scope: ResetScope, today: NaiveDate) -> Result<usize> {
        let events = self.read_all()?;
        let before = events.len();
        let kept: Vec<Event> = match scope {
            ResetScope::All => Vec::new(),
            ResetScope::Today => events.into_iter().filter(|e| e.date != today).collect(),
        };
        let removed = before - kept.len();

        let mut content = String::new();
        for event in &kept {
            content.push_str(&event.to_ndjson_line()?);
            content.push('\n');
        }
        atomic_write_file(&self.path, &content).map_err(|e| {
            CurfewError::ExternalFailure(format!("failed to rewrite events file: {}", e))
        })?;
        Ok(removed)
    }
}

impl StatsSink for EventLog {
    fn record_bypass_event(&self, date: NaiveDate) -> Result<()> {
        self.append(&Event::bypass(date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_log() -> (TempDir, EventLog) {
        let temp_dir = TempDir::new().unwrap();
        let log = EventLog::new(temp_dir.path().join("events.ndjson"));
        (temp_dir, log)
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::bypass(date(2024, 3, 1));
        let json_line = event.to_ndjson_line().unwrap();

        assert!(!json_line.contains('\n'));
        assert!(json_line.contains("\"bypass_completed\""));
        assert!(json_line.contains("\"2024-03-01\""));
        assert!(!event.actor.is_empty());
    }

    #[test]
    fn test_append_creates_file_with_one_line_per_event() {
        let (_temp_dir, log) = create_log();
        assert!(!log.path().exists());

        log.record_bypass_event(date(2024, 3, 1)).unwrap();
        log.record_bypass_event(date(2024, 3, 1)).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(log.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_read_missing_journal_is_empty() {
        let (_temp_dir, log) = create_log();
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let (_temp_dir, log) = create_log();
        log.record_bypass_event(date(2024, 3, 1)).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "{{\"ts\": truncated").unwrap();
        log.record_bypass_event(date(2024, 3, 2)).unwrap();

        assert_eq!(log.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_daily_counts_fill_empty_days() {
        let (_temp_dir, log) = create_log();
        log.record_bypass_event(date(2024, 3, 1)).unwrap();
        log.record_bypass_event(date(2024, 3, 3)).unwrap();
        log.record_bypass_event(date(2024, 3, 3)).unwrap();
        // Outside the window
        log.record_bypass_event(date(2024, 2, 1)).unwrap();

        let stats = log.daily_bypass_counts(date(2024, 3, 3), 3).unwrap();

        assert_eq!(
            stats,
            vec![
                DayStats { date: date(2024, 3, 1), bypass_count: 1 },
                DayStats { date: date(2024, 3, 2), bypass_count: 0 },
                DayStats { date: date(2024, 3, 3), bypass_count: 2 },
            ]
        );
    }

    #[test]
    fn test_reset_today_keeps_other_days() {
        let (_temp_dir, log) = create_log();
        log.record_bypass_event(date(2024, 3, 2)).unwrap();
        log.record_bypass_event(date(2024, 3, 3)).unwrap();
        log.record_bypass_event(date(2024, 3, 3)).unwrap();

        let removed = log.reset(ResetScope::Today, date(2024, 3, 3)).unwrap();

        assert_eq!(removed, 2);
        let remaining = log.read_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].date, date(2024, 3, 2));
    }

    #[test]
    fn test_reset_all_empties_journal_and_drops_torn_lines() {
        let (_temp_dir, log) = create_log();
        log.record_bypass_event(date(2024, 3, 1)).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "{{\"ts\": truncated").unwrap();

        assert_eq!(log.reset(ResetScope::All, date(2024, 3, 3)).unwrap(), 1);
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "");

        // Appending after a reset still works.
        log.record_bypass_event(date(2024, 3, 3)).unwrap();
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_missing_journal_is_a_no_op() {
        let (_temp_dir, log) = create_log();
        assert_eq!(log.reset(ResetScope::Today, date(2024, 3, 3)).unwrap(), 0);
    }

    #[test]
    fn test_day_stats_wire_shape() {
        let json = serde_json::to_value(DayStats {
            date: date(2024, 3, 1),
            bypass_count: 4,
        })
        .unwrap();
        assert_eq!(json["date"], "2024-03-01");
        assert_eq!(json["bypassCount"], 4);
    }
}
