//! System-wide constants for the Accord trust primitive.

use rust_decimal::Decimal;

/// Minimum number of participants in a negotiation.
pub const MIN_PARTICIPANTS: usize = 2;

/// Timeout job interval in seconds (5 minutes).
pub const TIMEOUT_JOB_INTERVAL_SECS: u64 = 300;

/// Checkpoint job interval in seconds (30 minutes).
pub const CHECKPOINT_JOB_INTERVAL_SECS: u64 = 1800;

/// Appeal review deadline: days from submission until a PENDING appeal
/// must have a resolver assigned.
pub const REVIEW_DEADLINE_DAYS: i64 = 7;

/// Appeal escalation bound: days from submission until a REVIEWING appeal
/// must be resolved.
pub const REVIEW_ESCALATION_DAYS: i64 = 14;

/// Minimum review board size.
pub const REVIEW_BOARD_MIN: usize = 3;

/// Maximum review board size.
pub const REVIEW_BOARD_MAX: usize = 7;

/// Sliding window for the per-relationship trust rate limit, in days.
pub const TRUST_RATE_WINDOW_DAYS: i64 = 30;

/// Bounded number of receipt-append retries before a transition aborts.
pub const MAX_APPEND_RETRIES: usize = 3;

/// Lease name held by the timeout job.
pub const TIMEOUT_LEASE_NAME: &str = "accord:job:timeout";

/// Lease name held by the checkpoint job.
pub const CHECKPOINT_LEASE_NAME: &str = "accord:job:checkpoint";

/// Environment variable holding the optional base64 system signing key.
pub const ENV_SYSTEM_SIGNING_KEY: &str = "SYSTEM_SIGNING_KEY";

/// Environment variable holding the optional distributed lease store URI.
pub const ENV_SCHEDULER_LOCK_BACKEND: &str = "SCHEDULER_LOCK_BACKEND";

/// Maximum magnitude of a single trust delta.
#[must_use]
pub fn max_trust_delta() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

/// Default trust delta applied to the disputer when a binding is disputed.
#[must_use]
pub fn dispute_trust_delta() -> Decimal {
    Decimal::new(-1, 1) // -0.1
}

/// Monthly cumulative trust-change cap per relationship:
/// 20% of the trust range [-1.0, 1.0].
#[must_use]
pub fn monthly_trust_cap() -> Decimal {
    Decimal::new(4, 1) // 0.4
}

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Accord";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispute_delta_within_bound() {
        assert!(dispute_trust_delta().abs() <= max_trust_delta());
    }

    #[test]
    fn monthly_cap_is_twenty_percent_of_range() {
        // Trust range is [-1.0, 1.0], width 2.0.
        assert_eq!(monthly_trust_cap(), Decimal::new(2, 0) * Decimal::new(2, 1));
    }
}
