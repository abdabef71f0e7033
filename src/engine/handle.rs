//! Shared access to the engine from async tasks.
//!
//! The engine sits behind a `std::sync::Mutex` that is only ever held for
//! synchronous work; no lock guard crosses an `.await`. Payment
//! verification, the one network call, runs on the blocking pool between
//! two short critical sections.

use super::{LockEngine, PaymentCheck};
use crate::collaborators::{PaymentVerdict, PaymentVerifier};
use crate::error::{CurfewError, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::info;

/// How a client proposes to finish a bypass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassCompletion {
    Challenge {
        challenge_id: String,
        proof: String,
    },
    Payment {
        challenge_id: Option<String>,
        reference: Option<String>,
    },
}

/// Cloneable handle to the single engine instance.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<Mutex<LockEngine>>,
    rearmed: Arc<Notify>,
    verifier: Arc<dyn PaymentVerifier>,
}

impl EngineHandle {
    pub fn new(engine: LockEngine, verifier: Arc<dyn PaymentVerifier>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            rearmed: Arc::new(Notify::new()),
            verifier,
        }
    }

    /// Run `f` with exclusive access to the engine.
    ///
    /// Wakes the timer driver when `f` changed the next deadline.
    pub fn with<R>(&self, f: impl FnOnce(&mut LockEngine) -> R) -> R {
        let mut engine = self.engine.lock().unwrap_or_else(|poison| poison.into_inner());
        let before = engine.next_deadline();
        let result = f(&mut engine);
        if engine.next_deadline() != before {
            self.rearmed.notify_one();
        }
        result
    }

    /// Resolves after some operation re-armed the timers.
    pub async fn rearmed(&self) {
        self.rearmed.notified().await;
    }

    /// Complete a bypass through either path.
    pub async fn complete_bypass(&self, completion: BypassCompletion) -> Result<DateTime<Utc>> {
        match completion {
            BypassCompletion::Challenge {
                challenge_id,
                proof,
            } => self.with(|engine| engine.complete_challenge_bypass(&challenge_id, &proof)),
            BypassCompletion::Payment {
                challenge_id,
                reference,
            } => {
                let check = self.with(|engine| engine.prepare_payment_bypass())?;

                if let PaymentCheck::Verify { secret_key } = check {
                    let reference = reference.filter(|r| !r.is_empty()).ok_or_else(|| {
                        CurfewError::InvalidRequest(
                            "A payment reference (paymentRef) is required to verify the payment."
                                .to_string(),
                        )
                    })?;
                    self.verify_payment(secret_key, reference).await?;
                }

                self.with(|engine| engine.complete_payment_bypass(challenge_id.as_deref()))
            }
        }
    }

    async fn verify_payment(&self, secret_key: String, reference: String) -> Result<()> {
        let verifier = Arc::clone(&self.verifier);
        let verdict = tokio::task::spawn_blocking(move || verifier.verify(&secret_key, &reference))
            .await
            .map_err(|e| {
                CurfewError::ExternalFailure(format!("payment verification task failed: {}", e))
            })??;

        match verdict {
            PaymentVerdict::Verified => {
                info!("payment verified");
                Ok(())
            }
            PaymentVerdict::Rejected(reason) => Err(CurfewError::InvalidOperation(reason)),
        }
    }
}
