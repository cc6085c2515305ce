//! # accord-scheduler
//!
//! **Out-of-band enforcement plane**: the periodic jobs that keep the
//! protocol's clocks honest.
//!
//! ## Architecture
//!
//! 1. **Lease**: exclusive, auto-expiring, owner-checked leases; degrades
//!    to an in-process mutex in single-node mode
//! 2. **jobs**: the timeout job (expire overdue negotiations, escalate
//!    SLA-breached appeals) and the checkpoint job (Merkle anchors per
//!    principal)
//! 3. **Scheduler**: explicit start/stop lifecycle over tokio tasks
//!
//! The protocol does not require the scheduler to exist: deadlines are
//! also enforced lazily by the engine on next access.

pub mod jobs;
pub mod lease;
pub mod scheduler;

pub use jobs::{TimeoutReport, run_checkpoint_job, run_timeout_job};
pub use lease::{InProcessLease, Lease, LeaseGuard, lease_from_config};
pub use scheduler::Scheduler;
