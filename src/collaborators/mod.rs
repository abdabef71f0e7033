//! Side-effect boundaries of the lock engine.
//!
//! The engine never touches the platform directly. Enforcement, statistics,
//! notifications and payment checks sit behind these small traits so that
//! tests can inject recording fakes and platforms without a mechanism can
//! use the no-op implementations.

pub mod guard;
pub mod notify;
pub mod payment;

use crate::error::Result;
use chrono::NaiveDate;
use std::sync::Arc;

pub use guard::{MarkerGuard, NoopGuard};
pub use notify::{CommandNotifier, LogNotifier};
pub use payment::{PaymentVerdict, StripeVerifier};

/// Physically blocks (or unblocks) the guarded tool.
pub trait EnforcementGuard: Send + Sync {
    /// Apply enforcement. Returns handoff keys for work the lock interrupted.
    fn install_enforcement(&self) -> Result<Vec<String>>;

    fn remove_enforcement(&self) -> Result<()>;
}

/// Receives one event per completed bypass.
pub trait StatsSink: Send + Sync {
    fn record_bypass_event(&self, date: NaiveDate) -> Result<()>;
}

/// Best-effort user notification. Failures are swallowed by implementations.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Checks a payment reference with an external provider.
///
/// An `Err` means the provider could not be asked (network, timeout); a
/// `Rejected` verdict means it answered and the payment does not count.
pub trait PaymentVerifier: Send + Sync {
    fn verify(&self, secret_key: &str, reference: &str) -> Result<PaymentVerdict>;
}

/// The collaborators injected into a lock engine.
#[derive(Clone)]
pub struct Collaborators {
    pub guard: Arc<dyn EnforcementGuard>,
    pub stats: Arc<dyn StatsSink>,
    pub notifier: Arc<dyn Notifier>,
}
