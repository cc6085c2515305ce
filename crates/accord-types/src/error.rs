//! Error types for the Accord trust primitive.
//!
//! All errors use the `AC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Protocol errors (rejected transitions)
//! - 2xx: Cryptographic errors
//! - 3xx: Integrity errors (corruption; fatal to the host)
//! - 4xx: Concurrency errors (retriable)
//! - 5xx: Appeal errors
//! - 6xx: Trust-ledger errors
//! - 7xx: Rate limiting (surfaced verbatim from the outer middleware)
//! - 9xx: General / internal errors
//!
//! Protocol, cryptographic, and concurrency errors are returned to the
//! caller and the rejected transition leaves no partial effects behind.
//! Integrity errors must propagate: the host fails closed rather than
//! continuing on a compromised chain.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AppealId, AppealStatus, NegotiationId, NegotiationStatus, PrincipalId, TrustEventId};

/// Central error enum for all Accord operations.
#[derive(Debug, Error)]
pub enum AccordError {
    // =================================================================
    // Protocol Errors (1xx)
    // =================================================================
    /// The transition is not allowed in the negotiation's current state.
    #[error("AC_ERR_100: {operation} not allowed while negotiation is {status}")]
    InvalidState {
        operation: &'static str,
        status: NegotiationStatus,
    },

    /// The caller is not a participant, or not allowed in this role.
    #[error("AC_ERR_101: Permission denied for {principal}: {reason}")]
    PermissionDenied {
        principal: PrincipalId,
        reason: String,
    },

    /// A mutation was attempted on a BINDING negotiation.
    #[error("AC_ERR_102: Negotiation {0} is binding and immutable")]
    BindingImmutable(NegotiationId),

    /// `required_consensus_count` is outside [majority, participant count].
    #[error("AC_ERR_103: Consensus count {requested} outside permitted range [{min}, {max}]")]
    ConsensusBoundsError {
        requested: usize,
        min: usize,
        max: usize,
    },

    /// The negotiation deadline expired before the transition committed.
    #[error("AC_ERR_104: Deadline passed for negotiation {0}")]
    DeadlinePassed(NegotiationId),

    /// The requested negotiation does not exist.
    #[error("AC_ERR_105: Negotiation not found: {0}")]
    NegotiationNotFound(NegotiationId),

    /// A negotiation needs at least two participants.
    #[error("AC_ERR_106: Too few participants: {count}")]
    TooFewParticipants { count: usize },

    /// A negotiation with this ID already exists.
    #[error("AC_ERR_107: Negotiation already exists: {0}")]
    DuplicateNegotiation(NegotiationId),

    // =================================================================
    // Cryptographic Errors (2xx)
    // =================================================================
    /// A signature failed verification against the canonical message form.
    #[error("AC_ERR_200: Invalid signature from {principal} over {form} form")]
    InvalidSignature {
        principal: PrincipalId,
        form: &'static str,
    },

    /// The principal has no registered public key.
    #[error("AC_ERR_201: No public key registered for {0}")]
    KeyNotRegistered(PrincipalId),

    /// The principal already has a different registered public key.
    #[error("AC_ERR_202: Conflicting key registration for {0}")]
    KeyAlreadyRegistered(PrincipalId),

    /// The configured system signing key could not be decoded.
    #[error("AC_ERR_203: Invalid system signing key: {reason}")]
    InvalidSystemKey { reason: String },

    // =================================================================
    // Integrity Errors (3xx) — fatal to the host process
    // =================================================================
    /// The input contained a type the canonicalizer forbids.
    #[error("AC_ERR_300: Canonicalization failed: {reason}")]
    Canonicalization { reason: String },

    /// A hash chain no longer replays to its recorded head.
    #[error("AC_ERR_301: Hash chain mismatch for {principal} at index {index}")]
    HashChainMismatch {
        principal: PrincipalId,
        index: usize,
    },

    /// The persistence layer returned inconsistent state.
    #[error("AC_ERR_302: Storage integrity violation: {reason}")]
    StorageIntegrity { reason: String },

    // =================================================================
    // Concurrency Errors (4xx) — retriable, no state change occurred
    // =================================================================
    /// Another writer won the race; the caller may retry.
    #[error("AC_ERR_400: Concurrent modification: {reason}")]
    Concurrency { reason: String },

    /// The scheduler's exclusive lease expired mid-job.
    #[error("AC_ERR_401: Lease lost: {name}")]
    LeaseLost { name: String },

    // =================================================================
    // Appeal Errors (5xx)
    // =================================================================
    /// The requested appeal does not exist.
    #[error("AC_ERR_500: Appeal not found: {0}")]
    AppealNotFound(AppealId),

    /// The operation is not allowed in the appeal's current state.
    #[error("AC_ERR_501: {operation} not allowed while appeal is {status}")]
    InvalidAppealState {
        operation: &'static str,
        status: AppealStatus,
    },

    /// Review boards must have between three and seven members.
    #[error("AC_ERR_502: Review board size {size} outside [3, 7]")]
    ReviewBoardSize { size: usize },

    /// A resolver or board member conflicts with a party to the dispute.
    #[error("AC_ERR_503: {principal} is a party to the dispute and cannot review it")]
    ReviewerConflict { principal: PrincipalId },

    /// The appeal's review SLA has been breached (triggers escalation).
    #[error("AC_ERR_504: Appeal SLA breached: {0}")]
    AppealSlaBreached(AppealId),

    /// No eligible resolver remained after exclusions.
    #[error("AC_ERR_505: No eligible resolver for appeal {0}")]
    NoEligibleResolver(AppealId),

    // =================================================================
    // Trust-Ledger Errors (6xx)
    // =================================================================
    /// A trust delta exceeded the per-event magnitude bound.
    #[error("AC_ERR_600: Trust delta {delta} exceeds magnitude bound")]
    TrustDeltaOutOfBounds { delta: Decimal },

    /// The monthly cumulative trust change for a relationship is exhausted.
    #[error("AC_ERR_601: Trust rate limit reached between {actor} and {subject}")]
    TrustRateLimited {
        actor: PrincipalId,
        subject: PrincipalId,
    },

    /// The referenced trust event does not exist.
    #[error("AC_ERR_602: Trust event not found: {0}")]
    TrustEventNotFound(TrustEventId),

    // =================================================================
    // Rate Limiting (7xx)
    // =================================================================
    /// The outer middleware rejected the request; surfaced verbatim.
    #[error("AC_ERR_700: Rate limited: {reason}")]
    RateLimited { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("AC_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("AC_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (bad env var, malformed key, etc.).
    #[error("AC_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl AccordError {
    /// Integrity errors must propagate up and fail the host closed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Canonicalization { .. }
                | Self::HashChainMismatch { .. }
                | Self::StorageIntegrity { .. }
        )
    }

    /// Concurrency errors may be retried by the caller.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Concurrency { .. } | Self::LeaseLost { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, AccordError>;

impl From<serde_json::Error> for AccordError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
