//! # accord-engine
//!
//! **Protocol plane**: the negotiation state machine, consensus
//! detection, binding-hash derivation, and the appeal subsystem.
//!
//! ## Architecture
//!
//! 1. **NegotiationStore**: versioned snapshots with transactional
//!    commit; the append-only message log
//! 2. **KeyRing**: read-only principal key registry; keys freeze per
//!    negotiation at enrollment
//! 3. **consensus**: acceptance grouping, conflict resolution, and the
//!    consensus/binding hash derivations
//! 4. **NegotiationEngine**: the transitions — create, join, offer,
//!    accept, finalize, withdraw, dispute, expire
//! 5. **AppealDesk**: dispute due process with SLA-bounded escalation
//!
//! ## Transition Flow
//!
//! ```text
//! caller → engine.snapshot() → validate → mutate clone
//!        → store.commit() → receipts.append() → message log
//! ```
//!
//! Everything fallible — precondition checks and the version-checked
//! commit — runs before the first append to any ledger, so a rejected
//! transition leaves no state, no receipts, and no messages.

pub mod appeals;
pub mod consensus;
pub mod engine;
pub mod keyring;
pub mod store;

pub use appeals::AppealDesk;
pub use engine::{DisputeOutcome, NegotiationEngine};
pub use keyring::KeyRing;
pub use store::NegotiationStore;
