//! Hash-chain verification for receipts and trust events.
//!
//! An external verifier needs only the canonicalizer and SHA-256 to walk
//! a chain end-to-end: recompute each entry's content hash from its
//! canonical body, check the `previous_hash` linkage from genesis, and
//! compare the final hash against the claimed head.

use accord_types::{GENESIS_HASH, Receipt, Result, TrustEvent};

use crate::hashing::hash_canonical;

/// Recompute a receipt's content hash from its canonical body.
///
/// # Errors
/// Propagates canonicalization failures from corrupt metadata.
pub fn receipt_content_hash(receipt: &Receipt) -> Result<[u8; 32]> {
    hash_canonical(&receipt.canonical_body())
}

/// Recompute a trust event's content hash from its canonical body.
///
/// # Errors
/// Propagates canonicalization failures from corrupt context.
pub fn trust_event_content_hash(event: &TrustEvent) -> Result<[u8; 32]> {
    hash_canonical(&event.canonical_body())
}

/// Verify a principal's receipt chain end-to-end.
///
/// `receipts_in_order` must run genesis→head. Returns `false` when any
/// stored content hash does not match its recomputed value, any
/// `previous_hash` pointer is broken, or the final hash differs from
/// `head_hash`. An empty chain verifies iff `head_hash` is the genesis
/// (zero) hash.
#[must_use]
pub fn verify_chain(head_hash: &[u8; 32], receipts_in_order: &[Receipt]) -> bool {
    let mut expected_prev = GENESIS_HASH;
    for receipt in receipts_in_order {
        if receipt.previous_hash != expected_prev {
            return false;
        }
        let Ok(recomputed) = receipt_content_hash(receipt) else {
            return false;
        };
        if recomputed != receipt.content_hash {
            return false;
        }
        expected_prev = receipt.content_hash;
    }
    expected_prev == *head_hash
}

/// Verify an actor's trust-event chain end-to-end, same contract as
/// [`verify_chain`].
#[must_use]
pub fn verify_trust_chain(head_hash: &[u8; 32], events_in_order: &[TrustEvent]) -> bool {
    let mut expected_prev = GENESIS_HASH;
    for event in events_in_order {
        if event.previous_hash != expected_prev {
            return false;
        }
        let Ok(recomputed) = trust_event_content_hash(event) else {
            return false;
        };
        if recomputed != event.content_hash {
            return false;
        }
        expected_prev = event.content_hash;
    }
    expected_prev == *head_hash
}
