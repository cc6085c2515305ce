//! # accord-types
//!
//! Shared types, canonical encoding, and errors for the **Accord** trust
//! primitive.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`PrincipalId`], [`NegotiationId`], [`MessageId`], [`ReceiptId`], [`TrustEventId`], [`AppealId`]
//! - **Canonical encoding**: [`canon`] — the deterministic byte form for everything hashed or signed
//! - **Negotiation model**: [`Negotiation`], [`NegotiationStatus`], [`Acceptance`], [`Finalization`]
//! - **Message model**: [`NegotiationMessage`], [`MessageKind`], and the named signing forms
//! - **Receipt model**: [`Receipt`], [`ReceiptAction`]
//! - **Trust model**: [`TrustEvent`], [`TrustEventType`]
//! - **Appeal model**: [`Appeal`], [`AppealStatus`], [`AppealOutcome`]
//! - **Configuration**: [`CoreConfig`], [`SchedulerConfig`]
//! - **Errors**: [`AccordError`] with `AC_ERR_` prefix codes
//! - **Constants**: protocol bounds and defaults

pub mod appeal;
pub mod canon;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod message;
pub mod negotiation;
pub mod principal;
pub mod receipt;
pub mod trust_event;

// Re-export all primary types at crate root for ergonomic imports:
//   use accord_types::{Negotiation, Receipt, TrustEvent, ...};

pub use appeal::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use message::*;
pub use negotiation::*;
pub use principal::*;
pub use receipt::*;
pub use trust_event::*;

// Constants are accessed via `accord_types::constants::FOO`, and the
// canonicalizer via `accord_types::canon::*`
// (not re-exported to avoid name collisions).
