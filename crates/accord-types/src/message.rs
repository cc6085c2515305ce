//! Protocol messages and the named canonical forms that get signed.
//!
//! The canonical form is the **only** input to a signature; the transport
//! envelope may add fields, but they are never part of the signed bytes.
//! A mismatch between the claimed signed form and the actual negotiation
//! state (e.g. `terms_version` drift) therefore fails verification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{MessageId, NegotiationId, PrincipalId, Result, canon};

/// The closed set of protocol message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Offer,
    Join,
    Accept,
    Finalize,
    Withdraw,
    Dispute,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offer => write!(f, "OFFER"),
            Self::Join => write!(f, "JOIN"),
            Self::Accept => write!(f, "ACCEPT"),
            Self::Finalize => write!(f, "FINALIZE"),
            Self::Withdraw => write!(f, "WITHDRAW"),
            Self::Dispute => write!(f, "DISPUTE"),
        }
    }
}

/// One entry in a negotiation's append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationMessage {
    pub message_id: MessageId,
    pub negotiation_id: NegotiationId,
    pub sender: PrincipalId,
    pub kind: MessageKind,
    /// The full canonical payload of the transition.
    pub payload: Vec<u8>,
    /// Ed25519 signature, present for signed transitions (accept, finalize).
    pub signature: Option<Vec<u8>>,
    /// Set true only after the crypto service verified the signature
    /// against the sender's registered key and the canonical form.
    pub signature_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl NegotiationMessage {
    /// An unsigned log entry for transitions authorized by identity alone.
    #[must_use]
    pub fn unsigned(
        negotiation_id: NegotiationId,
        sender: PrincipalId,
        kind: MessageKind,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            message_id: MessageId::new(),
            negotiation_id,
            sender,
            kind,
            payload,
            signature: None,
            signature_verified: false,
            created_at: Utc::now(),
        }
    }

    /// A signed log entry; `signature_verified` must only be set by the
    /// engine after verification succeeded.
    #[must_use]
    pub fn signed(
        negotiation_id: NegotiationId,
        sender: PrincipalId,
        kind: MessageKind,
        payload: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            message_id: MessageId::new(),
            negotiation_id,
            sender,
            kind,
            payload,
            signature: Some(signature),
            signature_verified: true,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Named message forms (bit-exact for signing)
// ---------------------------------------------------------------------------

/// Name of the acceptance form, used in error reporting.
pub const ACCEPTANCE_FORM: &str = "acceptance";

/// Name of the finalization form.
pub const FINALIZATION_FORM: &str = "finalization";

/// Canonical acceptance form:
/// `{"negotiation_id": <hex>, "terms_hash": <hex>, "terms_version": <int>}`.
///
/// # Errors
/// Propagates canonicalization failures (cannot occur for these inputs).
pub fn acceptance_signing_payload(
    negotiation_id: NegotiationId,
    terms_version: u64,
    terms_hash: &[u8; 32],
) -> Result<Vec<u8>> {
    canon::to_canonical_bytes(&json!({
        "negotiation_id": negotiation_id.canonical(),
        "terms_version": terms_version,
        "terms_hash": canon::canon_hash(terms_hash),
    }))
}

/// Canonical finalization form:
/// `{"consensus_hash": <hex>, "negotiation_id": <hex>}`.
///
/// # Errors
/// Propagates canonicalization failures (cannot occur for these inputs).
pub fn finalization_signing_payload(
    negotiation_id: NegotiationId,
    consensus_hash: &[u8; 32],
) -> Result<Vec<u8>> {
    canon::to_canonical_bytes(&json!({
        "negotiation_id": negotiation_id.canonical(),
        "consensus_hash": canon::canon_hash(consensus_hash),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
