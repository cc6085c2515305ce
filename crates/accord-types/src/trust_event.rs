//! Trust events: immutable, hash-chained records of trust-affecting
//! outcomes, one chain per actor. Consumed by external reputation logic.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{AccordError, PrincipalId, Result, TrustEventId, canon, constants};

/// The closed set of trust-affecting outcome kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustEventType {
    Interaction,
    Resonance,
    Alignment,
    Divergence,
    Conflict,
    Disclosure,
}

impl fmt::Display for TrustEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interaction => write!(f, "INTERACTION"),
            Self::Resonance => write!(f, "RESONANCE"),
            Self::Alignment => write!(f, "ALIGNMENT"),
            Self::Divergence => write!(f, "DIVERGENCE"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Disclosure => write!(f, "DISCLOSURE"),
        }
    }
}

/// A single entry in an actor's trust-event chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEvent {
    pub event_id: TrustEventId,
    pub actor_id: PrincipalId,
    pub subject_id: PrincipalId,
    pub event_type: TrustEventType,
    /// Bounded: |delta| ≤ 0.2. Canonicalized as a fixed-point string.
    pub trust_delta: Decimal,
    /// Opaque context; for CONFLICT events this carries
    /// `{negotiation_id, binding_hash, terms}`.
    pub context: Value,
    /// SHA-256 over the canonical event body.
    pub content_hash: [u8; 32],
    /// Content hash of the actor's previous trust event, or zero.
    pub previous_hash: [u8; 32],
    pub created_at: DateTime<Utc>,
    /// Stamped when a resolution event references this one.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TrustEvent {
    /// Enforce the per-event magnitude bound |delta| ≤ 0.2.
    ///
    /// # Errors
    /// Returns [`AccordError::TrustDeltaOutOfBounds`] beyond the bound.
    pub fn validate_delta(delta: Decimal) -> Result<()> {
        if delta.abs() > constants::max_trust_delta() {
            return Err(AccordError::TrustDeltaOutOfBounds { delta });
        }
        Ok(())
    }

    /// The canonical body hashed into `content_hash`. Each side of the
    /// conflict/appeal pair hashes only its own fields, so the mutual
    /// reference never forms a cycle in canonical encoding.
    #[must_use]
    pub fn canonical_body(&self) -> Value {
        json!({
            "actor_id": self.actor_id.canonical(),
            "subject_id": self.subject_id.canonical(),
            "event_type": self.event_type.to_string(),
            "trust_delta": canon::canon_delta(self.trust_delta),
            "context": self.context,
            "previous_hash": canon::canon_hash(&self.previous_hash),
            "created_at": canon::canon_timestamp(self.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_display() {
        assert_eq!(format!("{}", TrustEventType::Conflict), "CONFLICT");
        assert_eq!(format!("{}", TrustEventType::Disclosure), "DISCLOSURE");
    }

    #[test]
    fn delta_bound_enforced() {
        assert!(TrustEvent::validate_delta(Decimal::new(-1, 1)).is_ok()); // -0.1
        assert!(TrustEvent::validate_delta(Decimal::new(2, 1)).is_ok()); // 0.2
        let err = TrustEvent::validate_delta(Decimal::new(21, 2)).unwrap_err(); // 0.21
        assert!(matches!(err, AccordError::TrustDeltaOutOfBounds { .. }));
        let err = TrustEvent::validate_delta(Decimal::new(-3, 1)).unwrap_err(); // -0.3
        assert!(matches!(err, AccordError::TrustDeltaOutOfBounds { .. }));
    }

    #[test]
    fn canonical_body_encodes_delta_as_fixed_point() {
        let event = TrustEvent {
            event_id: TrustEventId::new(),
            actor_id: PrincipalId::new(),
            subject_id: PrincipalId::new(),
            event_type: TrustEventType::Conflict,
            trust_delta: Decimal::new(-1, 1),
            context: json!({"negotiation_id": "00"}),
            content_hash: [0u8; 32],
            previous_hash: [0u8; 32],
            created_at: Utc::now(),
            resolved_at: None,
        };
        let body = event.canonical_body();
        assert_eq!(body["trust_delta"], json!("-0.100"));
        // The body stays canonicalizable: the delta is a string, not a float.
        assert!(canon::to_canonical_bytes(&body).is_ok());
    }
}
