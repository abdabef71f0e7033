//! Schedule persistence.

use super::model::{NewSchedule, Schedule};
use crate::challenge::random_alnum;
use crate::error::{CurfewError, Result};
use crate::fs::atomic_write_file;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Where schedules live. The engine only ever reads them.
pub trait ScheduleStore: Send + Sync {
    fn list(&self) -> Result<Vec<Schedule>>;

    fn add(&self, schedule: NewSchedule) -> Result<Schedule>;

    /// Returns `false` when no schedule has this id.
    fn remove(&self, id: &str) -> Result<bool>;

    /// Returns `false` when no schedule has this id.
    fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool>;
}

/// JSON array in a single file, rewritten atomically on every change.
pub struct FileScheduleStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileScheduleStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<Schedule>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CurfewError::ExternalFailure(format!(
                    "failed to read schedules '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            CurfewError::ExternalFailure(format!(
                "failed to parse schedules '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write(&self, schedules: &[Schedule]) -> Result<()> {
        let json = serde_json::to_string_pretty(schedules).map_err(|e| {
            CurfewError::ExternalFailure(format!("failed to serialize schedules: {}", e))
        })?;
        atomic_write_file(&self.path, &json)
            .map_err(|e| CurfewError::ExternalFailure(format!("failed to save schedules: {}", e)))
    }

    fn update<F>(&self, id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<Schedule>, usize),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut schedules = self.read()?;
        let Some(index) = schedules.iter().position(|s| s.id == id) else {
            return Ok(false);
        };
        f(&mut schedules, index);
        self.write(&schedules)?;
        Ok(true)
    }
}

impl ScheduleStore for FileScheduleStore {
    fn list(&self) -> Result<Vec<Schedule>> {
        self.read()
    }

    fn add(&self, schedule: NewSchedule) -> Result<Schedule> {
        let id = format!(
            "sched-{}-{}",
            Utc::now().timestamp_millis(),
            random_alnum(4, &mut rand::thread_rng())
        );
        let schedule = schedule.into_schedule(id)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut schedules = self.read()?;
        schedules.push(schedule.clone());
        self.write(&schedules)?;

        info!(id = %schedule.id, name = %schedule.name, "schedule added");
        Ok(schedule)
    }

    fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.update(id, |schedules, index| {
            schedules.remove(index);
        })?;
        if removed {
            info!(id, "schedule removed");
        }
        Ok(removed)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let found = self.update(id, |schedules, index| {
            schedules[index].enabled = enabled;
        })?;
        if found {
            info!(id, enabled, "schedule toggled");
        }
        Ok(found)
    }
}
