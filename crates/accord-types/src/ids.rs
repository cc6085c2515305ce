//! Globally unique identifiers used throughout Accord.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! Canonical encoding renders every ID as its 32-char lowercase hex form
//! (no dashes), which is the only representation that enters hashed or
//! signed payloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// The 32-char lowercase hex form used in canonical payloads.
            #[must_use]
            pub fn canonical(&self) -> String {
                self.0.as_simple().to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a principal (a party able to sign transitions).
    PrincipalId,
    "principal"
);

uuid_id!(
    /// Unique identifier for a negotiation.
    NegotiationId,
    "negotiation"
);

uuid_id!(
    /// Unique identifier for a protocol message in the append-only log.
    MessageId,
    "msg"
);

uuid_id!(
    /// Unique identifier for a receipt in a principal's hash chain.
    ReceiptId,
    "receipt"
);

uuid_id!(
    /// Unique identifier for a trust event.
    TrustEventId,
    "trust"
);

uuid_id!(
    /// Unique identifier for an appeal.
    AppealId,
    "appeal"
);

impl PrincipalId {
    /// Extract the embedded timestamp (milliseconds since UNIX epoch) from UUIDv7.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(PrincipalId::new(), PrincipalId::new());
        assert_ne!(NegotiationId::new(), NegotiationId::new());
        assert_ne!(AppealId::new(), AppealId::new());
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = NegotiationId::new();
        let b = NegotiationId::new();
        assert!(a < b);
    }

    #[test]
    fn canonical_form_is_lowercase_hex() {
        let id = PrincipalId::new();
        let canon = id.canonical();
        assert_eq!(canon.len(), 32);
        assert!(canon.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(canon, canon.to_lowercase());
        assert!(!canon.contains('-'));
    }

    #[test]
    fn canonical_form_is_stable() {
        let id = NegotiationId::from_bytes([7u8; 16]);
        assert_eq!(id.canonical(), id.canonical());
        assert_eq!(id.canonical(), "07070707070707070707070707070707");
    }

    #[test]
    fn display_carries_prefix() {
        let id = AppealId::new();
        assert!(format!("{id}").starts_with("appeal:"));
    }

    #[test]
    fn principal_timestamp_extraction() {
        let before = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let id = PrincipalId::new();
        let after = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let ts = u128::from(id.timestamp_ms());
        assert!(ts >= before && ts <= after);
    }

    #[test]
    fn serde_roundtrip() {
        let id = TrustEventId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: TrustEventId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
