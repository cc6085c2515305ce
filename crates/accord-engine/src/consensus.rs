//! Consensus detection and the binding-hash derivation.
//!
//! Consensus is reached when at least `required_consensus_count`
//! principals hold verified acceptances for the *current* terms version
//! with the *same* terms hash. The consensus hash commits to that
//! acceptance set; the binding hash later commits to the consensus hash
//! plus every finalization signature.

use accord_crypto::hash_canonical;
use accord_types::{Negotiation, NegotiationId, PrincipalId, Result, canon};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// SHA-256 over the canonical terms object.
///
/// # Errors
/// Propagates canonicalization failures (e.g. floats in the terms).
pub fn terms_hash(terms: &Value) -> Result<[u8; 32]> {
    hash_canonical(terms)
}

/// Commitment to the acceptance set that achieved consensus:
/// `SHA-256(canon({negotiation_id, signatures: sorted, terms_hash,
/// terms_version}))`.
///
/// # Errors
/// Propagates canonicalization failures (cannot occur for these inputs).
pub fn consensus_hash(
    negotiation_id: NegotiationId,
    terms_version: u64,
    terms_hash: &[u8; 32],
    signatures: &[Vec<u8>],
) -> Result<[u8; 32]> {
    let mut sigs: Vec<String> = signatures.iter().map(hex::encode).collect();
    sigs.sort();
    hash_canonical(&json!({
        "negotiation_id": negotiation_id.canonical(),
        "terms_version": terms_version,
        "terms_hash": canon::canon_hash(terms_hash),
        "signatures": sigs,
    }))
}

/// Commitment to the fully finalized negotiation:
/// `SHA-256(canon({consensus_hash, signatures: sorted}))`.
///
/// # Errors
/// Propagates canonicalization failures (cannot occur for these inputs).
pub fn binding_hash(consensus_hash: &[u8; 32], signatures: &[Vec<u8>]) -> Result<[u8; 32]> {
    let mut sigs: Vec<String> = signatures.iter().map(hex::encode).collect();
    sigs.sort();
    hash_canonical(&json!({
        "consensus_hash": canon::canon_hash(consensus_hash),
        "signatures": sigs,
    }))
}

/// One group of identical acceptances that meets the quorum.
#[derive(Debug, Clone)]
pub struct ConsensusCandidate {
    pub terms_hash: [u8; 32],
    /// Contributors in canonical (sorted) principal order.
    pub contributors: Vec<PrincipalId>,
    /// Timestamp of the *last* contributing acceptance; the earliest
    /// decisive candidate wins a conflict.
    pub decisive_at: DateTime<Utc>,
}

/// Find every acceptance group at the current terms version that meets
/// `required_consensus_count`. More than one candidate is only possible
/// under implementation bugs or clock skew; the caller resolves via
/// [`select_winner`].
#[must_use]
pub fn detect(negotiation: &Negotiation) -> Vec<ConsensusCandidate> {
    let mut groups: Vec<ConsensusCandidate> = Vec::new();
    for (principal, acceptance) in &negotiation.acceptances {
        if acceptance.terms_version != negotiation.terms_version {
            continue;
        }
        match groups
            .iter_mut()
            .find(|g| g.terms_hash == acceptance.terms_hash)
        {
            Some(group) => {
                group.contributors.push(*principal);
                group.decisive_at = group.decisive_at.max(acceptance.accepted_at);
            }
            None => groups.push(ConsensusCandidate {
                terms_hash: acceptance.terms_hash,
                contributors: vec![*principal],
                decisive_at: acceptance.accepted_at,
            }),
        }
    }
    groups.retain(|g| g.contributors.len() >= negotiation.required_consensus_count);
    groups
}

/// Resolve simultaneous candidates: the earliest decisive acceptance
/// wins; ties break on lexicographic terms hash. Returns the winner and
/// the invalidated losers.
#[must_use]
pub fn select_winner(
    mut candidates: Vec<ConsensusCandidate>,
) -> Option<(ConsensusCandidate, Vec<ConsensusCandidate>)> {
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by(|a, b| {
        a.decisive_at
            .cmp(&b.decisive_at)
            .then_with(|| a.terms_hash.cmp(&b.terms_hash))
    });
    let winner = candidates.remove(0);
    Some((winner, candidates))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
