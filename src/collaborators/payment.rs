//! Payment verification for the payment bypass path.

use super::PaymentVerifier;
use crate::error::{CurfewError, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

static PAYMENT_INTENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^pi_[A-Za-z0-9_]+$").expect("Invalid payment intent regex"));

/// Outcome of a provider check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVerdict {
    Verified,
    Rejected(String),
}

/// Whether a string looks like a payment intent id.
pub fn is_payment_reference(reference: &str) -> bool {
    PAYMENT_INTENT_RE.is_match(reference)
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    status: String,
}

/// Verifies payment intents against the Stripe API.
pub struct StripeVerifier {
    agent: ureq::Agent,
    base_url: String,
}

impl StripeVerifier {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(STRIPE_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            base_url: base_url.into(),
        }
    }
}

impl PaymentVerifier for StripeVerifier {
    fn verify(&self, secret_key: &str, reference: &str) -> Result<PaymentVerdict> {
        if !is_payment_reference(reference) {
            return Ok(PaymentVerdict::Rejected(
                "Invalid payment intent ID. Must start with pi_".to_string(),
            ));
        }

        let url = format!("{}/payment_intents/{}", self.base_url, reference);
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", secret_key))
            .call();

        match response {
            Ok(resp) => {
                let intent: PaymentIntent = resp.into_json().map_err(|e| {
                    CurfewError::ExternalFailure(format!(
                        "payment verification returned an unreadable response: {}",
                        e
                    ))
                })?;
                Ok(verdict_for_status(&intent.status))
            }
            Err(ureq::Error::Status(404, _)) => Ok(PaymentVerdict::Rejected(
                "Payment not found".to_string(),
            )),
            Err(ureq::Error::Status(code, _)) => Err(CurfewError::ExternalFailure(format!(
                "payment verification failed with http status {}",
                code
            ))),
            Err(ureq::Error::Transport(transport)) => Err(CurfewError::ExternalFailure(format!(
                "payment verification transport error: {}",
                transport
            ))),
        }
    }
}

fn verdict_for_status(status: &str) -> PaymentVerdict {
    if status == "succeeded" {
        PaymentVerdict::Verified
    } else {
        PaymentVerdict::Rejected(format!("Payment not completed (status: {})", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_reference_shape() {
        assert!(is_payment_reference("pi_3Nabc_DEF123"));
        assert!(!is_payment_reference("pi_"));
        assert!(!is_payment_reference("ch_123"));
        assert!(!is_payment_reference("pi_123/../../customers"));
    }

    #[test]
    fn only_succeeded_verifies() {
        assert_eq!(verdict_for_status("succeeded"), PaymentVerdict::Verified);
        assert_eq!(
            verdict_for_status("requires_payment_method"),
            PaymentVerdict::Rejected(
                "Payment not completed (status: requires_payment_method)".to_string()
            )
        );
    }

    #[test]
    fn malformed_reference_is_rejected_without_network() {
        let verifier = StripeVerifier::with_base_url("http://127.0.0.1:9", Duration::from_millis(50));
        let verdict = verifier.verify("sk_test", "not-a-payment").unwrap();
        assert!(matches!(verdict, PaymentVerdict::Rejected(_)));
    }

    #[test]
    fn unreachable_provider_is_external_failure() {
        let verifier = StripeVerifier::with_base_url("http://127.0.0.1:9", Duration::from_millis(200));
        let err = verifier.verify("sk_test", "pi_123").unwrap_err();
        assert!(matches!(err, CurfewError::ExternalFailure(_)));
    }
}
