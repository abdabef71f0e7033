//! Shared fixtures for engine, router and daemon tests.

use crate::clock::ManualClock;
use crate::collaborators::{
    Collaborators, EnforcementGuard, Notifier, PaymentVerdict, PaymentVerifier, StatsSink,
};
use crate::config::Config;
use crate::engine::{EngineHandle, EngineSettings, LockEngine};
use crate::error::{CurfewError, Result};
use crate::events::EventLog;
use crate::protocol::Router;
use crate::record::StateStore;
use crate::schedule::{EvaluatorSettings, FileScheduleStore, ScheduleEvaluator};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 2024-01-01 09:00:00 UTC, a Monday.
pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
}

#[derive(Default)]
pub(crate) struct RecordingGuard {
    pub(crate) installs: AtomicUsize,
    pub(crate) removals: AtomicUsize,
    pub(crate) handoff_keys: Mutex<Vec<String>>,
    pub(crate) failing: AtomicBool,
}

impl RecordingGuard {
    pub(crate) fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub(crate) fn removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

impl EnforcementGuard for RecordingGuard {
    fn install_enforcement(&self) -> Result<Vec<String>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CurfewError::ExternalFailure("guard offline".to_string()));
        }
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(std::mem::take(&mut *self.handoff_keys.lock().unwrap()))
    }

    fn remove_enforcement(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CurfewError::ExternalFailure("guard offline".to_string()));
        }
        self.removals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingStats {
    pub(crate) dates: Mutex<Vec<NaiveDate>>,
}

impl RecordingStats {
    pub(crate) fn count(&self) -> usize {
        self.dates.lock().unwrap().len()
    }
}

impl StatsSink for RecordingStats {
    fn record_bypass_event(&self, date: NaiveDate) -> Result<()> {
        self.dates.lock().unwrap().push(date);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn bodies(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

/// Verifier with a canned answer that records every reference it sees.
pub(crate) struct FakeVerifier {
    pub(crate) outcome: Result<PaymentVerdict>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeVerifier {
    pub(crate) fn answering(outcome: Result<PaymentVerdict>) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl PaymentVerifier for FakeVerifier {
    fn verify(&self, _secret_key: &str, reference: &str) -> Result<PaymentVerdict> {
        self.calls.lock().unwrap().push(reference.to_string());
        self.outcome.clone()
    }
}

/// An isolated daemon home with a manual clock and recording collaborators.
pub(crate) struct EngineFixture {
    pub(crate) temp_dir: TempDir,
    pub(crate) clock: ManualClock,
    pub(crate) guard: Arc<RecordingGuard>,
    pub(crate) stats: Arc<RecordingStats>,
    pub(crate) notifier: Arc<RecordingNotifier>,
}

impl EngineFixture {
    pub(crate) fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("home")).unwrap();
        Self {
            temp_dir,
            clock: ManualClock::new(start_time()),
            guard: Arc::new(RecordingGuard::default()),
            stats: Arc::new(RecordingStats::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub(crate) fn home(&self) -> PathBuf {
        self.temp_dir.path().join("home")
    }

    pub(crate) fn state_path(&self) -> PathBuf {
        self.home().join("state.json")
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            guard: self.guard.clone(),
            stats: self.stats.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub(crate) fn engine_with(&self, config: &Config) -> LockEngine {
        LockEngine::new(
            StateStore::new(self.state_path()),
            Arc::new(self.clock.clone()),
            self.collaborators(),
            EngineSettings::from(config),
        )
        .with_rng(StdRng::seed_from_u64(42))
    }

    pub(crate) fn engine(&self) -> LockEngine {
        self.engine_with(&Config::default())
    }

    pub(crate) fn handle_with(&self, config: &Config, verifier: FakeVerifier) -> EngineHandle {
        EngineHandle::new(self.engine_with(config), Arc::new(verifier))
    }

    /// A router over a fresh engine, with file-backed schedules and events
    /// in the fixture home.
    pub(crate) fn router_with(&self, config: Config, verifier: FakeVerifier) -> Router {
        let engine = self.handle_with(&config, verifier);
        let schedules = Arc::new(FileScheduleStore::new(self.home().join("schedules.json")));
        let evaluator = ScheduleEvaluator::new(
            schedules.clone(),
            self.notifier.clone(),
            EvaluatorSettings::from(&config),
        );
        Router::new(
            engine,
            schedules,
            Arc::new(Mutex::new(evaluator)),
            Arc::new(EventLog::new(self.home().join("events.ndjson"))),
            config,
            self.home().join("config.yaml"),
        )
    }

    pub(crate) fn router(&self) -> Router {
        self.router_with(
            Config::default(),
            FakeVerifier::answering(Ok(PaymentVerdict::Verified)),
        )
    }

    /// Make every further write of the lock record fail.
    pub(crate) fn break_storage(&self) {
        std::fs::remove_dir_all(self.home()).unwrap();
        std::fs::write(self.home(), "not a directory").unwrap();
    }
}
