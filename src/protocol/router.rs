//! Maps requests onto the engine, schedule store and config.

use super::messages::{Request, Response};
use crate::config::Config;
use crate::engine::{BypassCompletion, EngineHandle, EngineSettings, duration_from_minutes};
use crate::error::{CurfewError, Result};
use crate::events::{EventLog, ResetScope};
use crate::schedule::{EvaluatorSettings, NewSchedule, ScheduleEvaluator, ScheduleStore};
use chrono::Local;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const DEFAULT_STATS_DAYS: u32 = 7;
const MAX_STATS_DAYS: u32 = 366;

/// Live configuration plus where it is persisted.
struct ConfigState {
    config: Config,
    path: PathBuf,
}

/// Request router. Cheap to clone; one per connection.
#[derive(Clone)]
pub struct Router {
    engine: EngineHandle,
    schedules: Arc<dyn ScheduleStore>,
    evaluator: Arc<Mutex<ScheduleEvaluator>>,
    events: Arc<EventLog>,
    config: Arc<Mutex<ConfigState>>,
}

impl Router {
    pub fn new(
        engine: EngineHandle,
        schedules: Arc<dyn ScheduleStore>,
        evaluator: Arc<Mutex<ScheduleEvaluator>>,
        events: Arc<EventLog>,
        config: Config,
        config_path: PathBuf,
    ) -> Self {
        Self {
            engine,
            schedules,
            evaluator,
            events,
            config: Arc::new(Mutex::new(ConfigState {
                config,
                path: config_path,
            })),
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Handle one raw line and produce one response line.
    pub async fn handle_line(&self, line: &str) -> String {
        let response = match parse_request(line) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                debug!(error = %e, "rejected malformed request");
                Response::error(e.to_string())
            }
        };
        response.to_line()
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Status => self.status(),
            Request::Lock {
                duration_minutes,
                hard_lock,
            } => self.lock(duration_minutes, hard_lock),
            Request::Unlock => self.unlock(),
            Request::BypassStart => self.bypass_start(),
            Request::BypassComplete {
                challenge_id,
                proof,
                payment_method,
                payment_ref,
            } => {
                self.bypass_complete(challenge_id, proof, payment_method, payment_ref)
                    .await
            }
            Request::ScheduleList => match self.schedules.list() {
                Ok(schedules) => Response::ScheduleList { schedules },
                Err(e) => Response::error(e.to_string()),
            },
            Request::ScheduleAdd { schedule } => self.schedule_add(schedule),
            Request::ScheduleRemove { id } => {
                let result = self.gated("schedules", || self.schedules.remove(&id));
                let (ok, error) = found_or_not(result);
                Response::ScheduleRemove { ok, error }
            }
            Request::ScheduleToggle { id, enabled } => {
                let result = self.gated("schedules", || self.schedules.set_enabled(&id, enabled));
                let (ok, error) = found_or_not(result);
                Response::ScheduleToggle { ok, error }
            }
            Request::ConfigGet => Response::ConfigGet {
                config: self.redacted_config(),
            },
            Request::ConfigSet { key, value } => match self.config_set(&key, value) {
                Ok(()) => Response::ConfigSet {
                    ok: true,
                    error: None,
                },
                Err(e) => Response::ConfigSet {
                    ok: false,
                    error: Some(e.to_string()),
                },
            },
            Request::Stats { days, period } => {
                let days = days
                    .or(period.map(|p| p.days()))
                    .unwrap_or(DEFAULT_STATS_DAYS)
                    .clamp(1, MAX_STATS_DAYS);
                let today = self.engine.with(|e| e.now()).with_timezone(&Local).date_naive();
                match self.events.daily_bypass_counts(today, days) {
                    Ok(days) => Response::Stats { days },
                    Err(e) => Response::error(e.to_string()),
                }
            }
            Request::StatsReset { all } => {
                let scope = if all { ResetScope::All } else { ResetScope::Today };
                match self.stats_reset(scope) {
                    Ok(()) => Response::StatsReset {
                        ok: true,
                        cleared: scope,
                        error: None,
                    },
                    Err(e) => Response::StatsReset {
                        ok: false,
                        cleared: scope,
                        error: Some(e.to_string()),
                    },
                }
            }
            Request::HandoffClear => match self.engine.with(|e| e.clear_handoff_keys()) {
                Ok(keys) => Response::HandoffClear {
                    ok: true,
                    keys,
                    error: None,
                },
                Err(e) => Response::HandoffClear {
                    ok: false,
                    keys: Vec::new(),
                    error: Some(e.to_string()),
                },
            },
        }
    }

    fn status(&self) -> Response {
        match self.engine.with(|e| e.status()) {
            Ok(lock) => Response::Status {
                lock,
                config: self.redacted_config(),
            },
            Err(e) => Response::error(e.to_string()),
        }
    }

    fn lock(&self, duration_minutes: f64, hard_lock: bool) -> Response {
        let result = duration_from_minutes(duration_minutes)
            .and_then(|duration| self.engine.with(|e| e.lock(duration, None, hard_lock)));
        match result {
            Ok(lock) => Response::Lock {
                ok: true,
                lock,
                error: None,
            },
            Err(e) => Response::Lock {
                ok: false,
                lock: self.engine.with(|engine| engine.record().clone()),
                error: Some(e.to_string()),
            },
        }
    }

    fn unlock(&self) -> Response {
        self.engine.with(|engine| match engine.unlock() {
            Ok(lock) => Response::Unlock {
                ok: true,
                lock,
                error: None,
            },
            Err(e) => Response::Unlock {
                ok: false,
                lock: engine.record().clone(),
                error: Some(e.to_string()),
            },
        })
    }

    fn bypass_start(&self) -> Response {
        match self.engine.with(|e| e.start_bypass()) {
            Ok(start) => Response::BypassStart {
                ok: true,
                challenge_id: start.challenge_id,
                challenges: start.challenges,
                error: None,
                payment_option: start.payment_option,
            },
            Err(e) => Response::BypassStart {
                ok: false,
                challenge_id: String::new(),
                challenges: Vec::new(),
                error: Some(e.to_string()),
                payment_option: None,
            },
        }
    }

    async fn bypass_complete(
        &self,
        challenge_id: Option<String>,
        proof: Option<String>,
        payment_method: bool,
        payment_ref: Option<String>,
    ) -> Response {
        let completion = if payment_method {
            Some(BypassCompletion::Payment {
                challenge_id,
                reference: payment_ref,
            })
        } else {
            challenge_id.map(|challenge_id| BypassCompletion::Challenge {
                challenge_id,
                proof: proof.unwrap_or_default(),
            })
        };

        let result = match completion {
            Some(completion) => self.engine.complete_bypass(completion).await,
            None => Err(CurfewError::InvalidRequest(
                "challengeId is required".to_string(),
            )),
        };

        match result {
            Ok(grace_expires_at) => Response::BypassComplete {
                ok: true,
                grace_expires_at: Some(grace_expires_at),
                error: None,
            },
            Err(e) => {
                info!(error = %e, "bypass completion rejected");
                Response::BypassComplete {
                    ok: false,
                    grace_expires_at: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn schedule_add(&self, schedule: NewSchedule) -> Response {
        match self.gated("schedules", || self.schedules.add(schedule)) {
            Ok(schedule) => Response::ScheduleAdd {
                ok: true,
                schedule: Some(schedule),
                error: None,
            },
            Err(e) => Response::ScheduleAdd {
                ok: false,
                schedule: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Run `f` only while no lock period is running.
    fn gated<T>(&self, what: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.engine.with(|e| e.ensure_mutable(what))?;
        f()
    }

    fn config_set(&self, key: &str, value: Value) -> Result<()> {
        self.engine.with(|e| e.ensure_mutable("settings"))?;

        let mut state = self.config.lock().unwrap_or_else(|poison| poison.into_inner());
        let next = state.config.with_key(key, value)?;
        next.save(&state.path)?;
        state.config = next;

        let engine_settings = EngineSettings::from(&state.config);
        let evaluator_settings = EvaluatorSettings::from(&state.config);
        drop(state);

        self.engine.with(|e| e.reconfigure(engine_settings));
        self.evaluator
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .reconfigure(evaluator_settings);

        info!(key, "config updated");
        Ok(())
    }

    /// Runs under the engine lock so no bypass event lands mid-rewrite.
    fn stats_reset(&self, scope: ResetScope) -> Result<()> {
        self.engine.with(|engine| {
            engine.ensure_mutable("statistics")?;
            let today = engine.now().with_timezone(&Local).date_naive();
            let removed = self.events.reset(scope, today)?;
            info!(?scope, removed, "bypass statistics reset");
            Ok(())
        })
    }

    fn redacted_config(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .config
            .redacted()
    }
}

fn parse_request(line: &str) -> Result<Request> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| CurfewError::InvalidRequest(format!("Invalid JSON: {}", e)))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => {
            return Err(CurfewError::InvalidRequest(
                "Request is missing a string 'type' field".to_string(),
            ));
        }
    };

    serde_json::from_value(value).map_err(|e| {
        if e.to_string().contains("unknown variant") {
            CurfewError::InvalidRequest(format!("Unknown request type: {}", kind))
        } else {
            CurfewError::InvalidRequest(format!("Invalid {} request: {}", kind, e))
        }
    })
}

fn found_or_not(result: Result<bool>) -> (bool, Option<String>) {
    match result {
        Ok(true) => (true, None),
        Ok(false) => (false, Some("Schedule not found".to_string())),
        Err(e) => {
            warn!(error = %e, "schedule change rejected");
            (false, Some(e.to_string()))
        }
    }
}
