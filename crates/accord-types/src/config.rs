//! Configuration for the Accord core and its scheduler.
//!
//! Only two environment variables are observable by the core:
//! `SYSTEM_SIGNING_KEY` (optional base64 Ed25519 seed; absence disables
//! system signatures without affecting correctness) and
//! `SCHEDULER_LOCK_BACKEND` (optional lease store URI; absence enables
//! single-node mode).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Top-level configuration for a host running the Accord core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Base64-encoded Ed25519 seed for system receipt signatures.
    /// `None` skips system signing; receipts remain valid without it.
    pub system_signing_key: Option<String>,
    /// URI of the distributed lease store. `None` degrades the scheduler
    /// lease to an in-process mutex (single-node mode).
    pub scheduler_lock_backend: Option<String>,
    /// Write a `SIGNATURE_REJECTED` audit receipt when a signed transition
    /// fails verification. Off by default to avoid amplification.
    pub audit_rejected_signatures: bool,
    /// Scheduler timing.
    pub scheduler: SchedulerConfig,
}

impl CoreConfig {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            system_signing_key: std::env::var(constants::ENV_SYSTEM_SIGNING_KEY).ok(),
            scheduler_lock_backend: std::env::var(constants::ENV_SCHEDULER_LOCK_BACKEND).ok(),
            audit_rejected_signatures: false,
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Timing configuration for the periodic scheduler jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between timeout-enforcement runs.
    pub timeout_interval: Duration,
    /// Interval between receipt-checkpoint runs.
    pub checkpoint_interval: Duration,
    /// Lease time-to-live; must be at least the longest job interval.
    pub lease_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timeout_interval: Duration::from_secs(constants::TIMEOUT_JOB_INTERVAL_SECS),
            checkpoint_interval: Duration::from_secs(constants::CHECKPOINT_JOB_INTERVAL_SECS),
            lease_ttl: Duration::from_secs(constants::CHECKPOINT_JOB_INTERVAL_SECS),
        }
    }
}
