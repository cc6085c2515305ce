//! Cryptographic receipts: the tamper-evidence layer of Accord.
//!
//! Every committed transition produces at least one [`Receipt`] on the
//! acting principal's hash chain. Receipts are never updated or deleted;
//! each links to its predecessor through `previous_hash`, and the whole
//! chain is independently verifiable with nothing but the canonicalizer,
//! SHA-256, and (optionally) the system public key.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{PrincipalId, ReceiptId, canon};

/// The `previous_hash` of a principal's first receipt.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// The action a receipt proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptAction {
    /// A negotiation was created.
    CreateNegotiation,
    /// A listed participant joined.
    JoinNegotiation,
    /// New terms were offered, clearing prior acceptances.
    SendOffer,
    /// A signed acceptance of the current terms version was verified.
    AcceptTerms,
    /// A signed finalization over the consensus hash was verified.
    FinalizeCommitment,
    /// The negotiation reached BINDING (one receipt per negotiation).
    BindingReached,
    /// The negotiation was withdrawn before consensus.
    Withdraw,
    /// A binding agreement was disputed; links appeal and trust event.
    DisputeBinding,
    /// The scheduler expired an overdue negotiation.
    NegotiationExpired,
    /// Simultaneous consensus candidates were resolved; losers invalidated.
    ConsensusConflictResolved,
    /// Periodic Merkle checkpoint over a window of receipts.
    Checkpoint,
    /// A resolver was assigned to an appeal.
    AppealAssigned,
    /// A review board was attached to an appeal.
    AppealBoardSet,
    /// An appeal was resolved with an outcome.
    AppealResolved,
    /// An appeal was withdrawn by the appellant.
    AppealWithdrawn,
    /// An appeal breached its SLA and was escalated.
    AppealEscalated,
    /// Audit record for a rejected signature (off by default).
    SignatureRejected,
}

impl fmt::Display for ReceiptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateNegotiation => write!(f, "CREATE_NEGOTIATION"),
            Self::JoinNegotiation => write!(f, "JOIN_NEGOTIATION"),
            Self::SendOffer => write!(f, "SEND_OFFER"),
            Self::AcceptTerms => write!(f, "ACCEPT_TERMS"),
            Self::FinalizeCommitment => write!(f, "FINALIZE_COMMITMENT"),
            Self::BindingReached => write!(f, "BINDING_REACHED"),
            Self::Withdraw => write!(f, "WITHDRAW"),
            Self::DisputeBinding => write!(f, "DISPUTE_BINDING"),
            Self::NegotiationExpired => write!(f, "NEGOTIATION_EXPIRED"),
            Self::ConsensusConflictResolved => write!(f, "CONSENSUS_CONFLICT_RESOLVED"),
            Self::Checkpoint => write!(f, "CHECKPOINT"),
            Self::AppealAssigned => write!(f, "APPEAL_ASSIGNED"),
            Self::AppealBoardSet => write!(f, "APPEAL_BOARD_SET"),
            Self::AppealResolved => write!(f, "APPEAL_RESOLVED"),
            Self::AppealWithdrawn => write!(f, "APPEAL_WITHDRAWN"),
            Self::AppealEscalated => write!(f, "APPEAL_ESCALATED"),
            Self::SignatureRejected => write!(f, "SIGNATURE_REJECTED"),
        }
    }
}

/// A hash-chained receipt on one principal's append-only chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: ReceiptId,
    pub principal_id: PrincipalId,
    pub action: ReceiptAction,
    /// Opaque key/value metadata; part of the hashed body.
    pub metadata: Map<String, Value>,
    /// Content hash of this principal's previous receipt, or zero for genesis.
    pub previous_hash: [u8; 32],
    /// SHA-256 over the canonical receipt body.
    pub content_hash: [u8; 32],
    /// Optional Ed25519 signature over `content_hash` by the system key.
    pub system_signature: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl Receipt {
    /// The canonical body hashed into `content_hash`:
    /// `{action, created_at, metadata, previous_hash, principal_id}`.
    #[must_use]
    pub fn canonical_body(&self) -> Value {
        json!({
            "principal_id": self.principal_id.canonical(),
            "action": self.action.to_string(),
            "metadata": Value::Object(self.metadata.clone()),
            "previous_hash": canon::canon_hash(&self.previous_hash),
            "created_at": canon::canon_timestamp(self.created_at),
        })
    }

    /// Whether this is a checkpoint anchor.
    #[must_use]
    pub fn is_checkpoint(&self) -> bool {
        self.action == ReceiptAction::Checkpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_receipt() -> Receipt {
        Receipt {
            receipt_id: ReceiptId::new(),
            principal_id: PrincipalId::from_bytes([1u8; 16]),
            action: ReceiptAction::AcceptTerms,
            metadata: Map::new(),
            previous_hash: GENESIS_HASH,
            content_hash: [0u8; 32],
            system_signature: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn action_display() {
        assert_eq!(format!("{}", ReceiptAction::CreateNegotiation), "CREATE_NEGOTIATION");
        assert_eq!(format!("{}", ReceiptAction::BindingReached), "BINDING_REACHED");
        assert_eq!(format!("{}", ReceiptAction::Checkpoint), "CHECKPOINT");
    }

    #[test]
    fn canonical_body_excludes_content_hash_and_signature() {
        let r = make_receipt();
        let body = r.canonical_body();
        let obj = body.as_object().unwrap();
        assert!(obj.contains_key("principal_id"));
        assert!(obj.contains_key("previous_hash"));
        assert!(!obj.contains_key("content_hash"));
        assert!(!obj.contains_key("system_signature"));
        assert!(!obj.contains_key("receipt_id"));
    }

    #[test]
    fn canonical_body_is_canonicalizable() {
        let r = make_receipt();
        assert!(canon::to_canonical_bytes(&r.canonical_body()).is_ok());
    }

    #[test]
    fn metadata_changes_the_body() {
        let mut a = make_receipt();
        let b = a.clone();
        a.metadata.insert("k".into(), json!("v"));
        assert_ne!(
            canon::to_canonical_bytes(&a.canonical_body()).unwrap(),
            canon::to_canonical_bytes(&b.canonical_body()).unwrap()
        );
    }

    #[test]
    fn serde_roundtrip() {
        let r = make_receipt();
        let json = serde_json::to_string(&r).unwrap();
        let back: Receipt = serde_json::from_str(&json).unwrap();
        assert_eq!(r.receipt_id, back.receipt_id);
        assert_eq!(r.previous_hash, back.previous_hash);
    }
}
