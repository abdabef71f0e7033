//! The bypass challenge protocol.
//!
//! `start_bypass` issues a session; completion takes one of two paths.
//! The challenge path only needs a live session id: answers are checked by
//! the client before it calls in, and the `proof` is not re-validated here.
//! The payment path skips the session ledger and relies on the payment
//! verifier when a provider secret is configured.

use super::{LockEngine, PendingChallenge};
use crate::challenge::{Challenge, generate_challenges, random_alnum};
use crate::error::{CurfewError, Result};
use crate::record::LockStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// Payment alternative offered alongside (or instead of) challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    /// Amount in cents.
    pub amount: u32,
    pub currency: String,
    pub url: String,
    pub has_verification: bool,
}

/// Result of a successful `start_bypass`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassStart {
    pub challenge_id: String,
    pub challenges: Vec<Challenge>,
    pub payment_option: Option<PaymentOption>,
}

/// What the payment path needs before it can be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCheck {
    /// No provider configured; the payment is taken on trust.
    Unverified,
    /// The reference must be verified with this provider secret.
    Verify { secret_key: String },
}

impl LockEngine {
    /// Begin a bypass attempt.
    pub fn start_bypass(&mut self) -> Result<BypassStart> {
        let now = self.clock.now();
        self.ensure_bypassable(now)?;

        if !self.settings.challenge_bypass_enabled && self.settings.payment.is_none() {
            return Err(CurfewError::InvalidOperation(
                "Bypass is disabled. Wait for the lock to expire.".to_string(),
            ));
        }

        let mut next = self.record.clone();
        next.bypass_attempts = next.bypass_attempts.saturating_add(1);
        self.commit(next)?;
        let attempt = self.record.bypass_attempts;

        let challenges = if self.settings.challenge_bypass_enabled {
            generate_challenges(
                attempt,
                &self.settings.bypass_cooldowns,
                self.settings.justification_min_words,
                &mut self.rng,
            )
        } else {
            Vec::new()
        };

        let challenge_id = format!(
            "bypass-{}-{}",
            now.timestamp_millis(),
            random_alnum(6, &mut self.rng)
        );
        self.pending.insert(
            challenge_id.clone(),
            PendingChallenge {
                challenges: challenges.clone(),
                created_at: now,
            },
        );

        let payment_option = self.settings.payment.as_ref().map(|payment| PaymentOption {
            amount: payment.amount,
            currency: payment.currency.clone(),
            url: payment.url.clone(),
            has_verification: payment.secret_key.is_some(),
        });

        info!(attempt, challenge_id = %challenge_id, count = challenges.len(), "bypass started");
        Ok(BypassStart {
            challenge_id,
            challenges,
            payment_option,
        })
    }

    /// Complete a bypass through the challenge path.
    pub fn complete_challenge_bypass(
        &mut self,
        challenge_id: &str,
        proof: &str,
    ) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        self.reconcile(now)?;

        if !self.pending.contains_key(challenge_id) {
            return Err(CurfewError::ExpiredSession(
                "Invalid or expired challenge".to_string(),
            ));
        }
        self.ensure_bypassable(now)?;
        if !self.settings.challenge_bypass_enabled {
            return Err(CurfewError::InvalidOperation(
                "Challenge bypass is disabled.".to_string(),
            ));
        }

        let grace_expires_at = self.grant_grace(now)?;
        if let Some(session) = self.pending.remove(challenge_id) {
            debug!(
                challenge_id,
                issued = session.challenges.len(),
                age_secs = (now - session.created_at).num_seconds(),
                proof_len = proof.len(),
                "challenge session consumed"
            );
        }
        Ok(grace_expires_at)
    }

    /// First half of the payment path: confirm a payment bypass is
    /// possible right now and say whether it must be verified.
    pub fn prepare_payment_bypass(&mut self) -> Result<PaymentCheck> {
        let now = self.clock.now();
        self.ensure_bypassable(now)?;

        let payment = self.settings.payment.as_ref().ok_or_else(|| {
            CurfewError::InvalidOperation("Payment bypass is disabled.".to_string())
        })?;

        Ok(match &payment.secret_key {
            Some(secret_key) => PaymentCheck::Verify {
                secret_key: secret_key.clone(),
            },
            None => PaymentCheck::Unverified,
        })
    }

    /// Second half of the payment path, called once verification (if any)
    /// has succeeded. State is re-checked because it may have moved on
    /// while the verifier was waiting on the network.
    pub fn complete_payment_bypass(&mut self, challenge_id: Option<&str>) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        self.ensure_bypassable(now)?;
        if self.settings.payment.is_none() {
            return Err(CurfewError::InvalidOperation(
                "Payment bypass is disabled.".to_string(),
            ));
        }

        let grace_expires_at = self.grant_grace(now)?;
        if let Some(id) = challenge_id {
            self.pending.remove(id);
        }
        Ok(grace_expires_at)
    }

    /// Locked and not hard-locked, after lazy correction.
    fn ensure_bypassable(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.reconcile(now)?;
        match self.record.status {
            LockStatus::Locked if !self.record.bypassable() => Err(CurfewError::InvalidOperation(
                "This is a hard lock. Bypass is not available; wait for it to expire."
                    .to_string(),
            )),
            LockStatus::Locked => Ok(()),
            LockStatus::Grace => Err(CurfewError::InvalidOperation(
                "Already in a grace period.".to_string(),
            )),
            LockStatus::Unlocked => Err(CurfewError::InvalidOperation(
                "Not locked; there is nothing to bypass.".to_string(),
            )),
        }
    }
}
