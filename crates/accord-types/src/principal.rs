//! Principals: the signing parties of the protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PrincipalId;

/// Raw Ed25519 public key bytes.
pub type PublicKeyBytes = [u8; 32];

/// A principal able to participate in signed negotiation transitions.
///
/// The public key registered here is copied into each negotiation the
/// principal enrolls in and frozen there for the negotiation's lifetime;
/// later re-registration never affects in-flight negotiations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: PrincipalId,
    /// 32-byte Ed25519 public key.
    pub public_key: PublicKeyBytes,
    pub registered_at: DateTime<Utc>,
}

impl Principal {
    #[must_use]
    pub fn new(principal_id: PrincipalId, public_key: PublicKeyBytes) -> Self {
        Self {
            principal_id,
            public_key,
            registered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let p = Principal::new(PrincipalId::new(), [9u8; 32]);
        let json = serde_json::to_string(&p).unwrap();
        let back: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
