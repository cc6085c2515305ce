//! Negotiation model: the monotonic state machine at the heart of Accord.
//!
//! ## State Machine
//!
//! ```text
//!   INITIATED ──▶ NEGOTIATING ──▶ CONSENSUS_REACHED ──▶ BINDING ──▶ DISPUTED
//!       │              │                  │
//!       │ withdraw     │ withdraw         │
//!       ▼              ▼                  │
//!   WITHDRAWN      WITHDRAWN              │
//!       │ expire       │ expire           │ expire
//!       ▼              ▼                  ▼
//!    EXPIRED        EXPIRED            EXPIRED
//! ```
//!
//! Transitions are **monotonic** (never go backwards). BINDING is the
//! cryptographic point of no return: once `binding_hash` exists the
//! negotiation is immutable and only `dispute` is permitted. BINDING
//! negotiations never expire.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AccordError, NegotiationId, PrincipalId, PublicKeyBytes, Result};

/// Lifecycle status of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationStatus {
    /// Created; waiting for listed participants to join.
    Initiated,
    /// Active bargaining: offers and acceptances flow.
    Negotiating,
    /// Enough identical acceptances at the current terms version.
    ConsensusReached,
    /// Every contributing participant finalized. Irreversible.
    Binding,
    /// A participant disputed the binding agreement.
    Disputed,
    /// Withdrawn before consensus.
    Withdrawn,
    /// Deadline passed before binding.
    Expired,
}

impl NegotiationStatus {
    /// Can this status transition to the given target status?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Initiated, Self::Negotiating | Self::Withdrawn | Self::Expired)
                | (
                    Self::Negotiating,
                    Self::ConsensusReached | Self::Withdrawn | Self::Expired
                )
                | (Self::ConsensusReached, Self::Binding | Self::Expired)
                | (Self::Binding, Self::Disputed)
        )
    }

    /// Terminal states admit no further transitions at all.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disputed | Self::Withdrawn | Self::Expired)
    }

    /// States from which the scheduler may expire a negotiation.
    #[must_use]
    pub fn is_expirable(&self) -> bool {
        matches!(
            self,
            Self::Initiated | Self::Negotiating | Self::ConsensusReached
        )
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiated => write!(f, "INITIATED"),
            Self::Negotiating => write!(f, "NEGOTIATING"),
            Self::ConsensusReached => write!(f, "CONSENSUS_REACHED"),
            Self::Binding => write!(f, "BINDING"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Withdrawn => write!(f, "WITHDRAWN"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Acceptance / Finalization records
// ---------------------------------------------------------------------------

/// A verified acceptance of a specific terms version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    /// The terms version the signature covers.
    pub terms_version: u64,
    /// SHA-256 of the canonical terms at that version.
    pub terms_hash: [u8; 32],
    /// Ed25519 signature over the acceptance message form.
    pub signature: Vec<u8>,
    pub accepted_at: DateTime<Utc>,
}

/// A verified finalization signature over the consensus hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalization {
    /// Ed25519 signature over the finalization message form.
    pub signature: Vec<u8>,
    pub finalized_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// A multi-party negotiation owned by the coordinating host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub negotiation_id: NegotiationId,
    pub creator_id: PrincipalId,
    /// Ordered set of enrolled principals, creator included. Size ≥ 2.
    pub participants: Vec<PrincipalId>,
    /// Public keys frozen per participant for this negotiation's lifetime.
    pub participant_keys: BTreeMap<PrincipalId, PublicKeyBytes>,
    /// Participants who have joined (creator joins implicitly at create).
    pub joined: BTreeSet<PrincipalId>,
    pub status: NegotiationStatus,
    /// Opaque, canonicalizable terms object.
    pub current_terms: Value,
    /// Monotonically increasing; incremented on every terms-changing offer.
    pub terms_version: u64,
    /// Acceptances needed for consensus, in [majority, |participants|].
    pub required_consensus_count: usize,
    /// Acceptances for the *current* terms version only; cleared on offer.
    pub acceptances: BTreeMap<PrincipalId, Acceptance>,
    /// Finalization signatures gathered in CONSENSUS_REACHED.
    pub finalizations: BTreeMap<PrincipalId, Finalization>,
    /// Commitment to the acceptance set that achieved consensus.
    pub consensus_hash: Option<[u8; 32]>,
    /// The principals whose acceptances contributed to consensus; all of
    /// them must finalize before the negotiation becomes BINDING.
    pub consensus_participants: Vec<PrincipalId>,
    /// Commitment to the fully finalized negotiation. Defined iff BINDING.
    pub binding_hash: Option<[u8; 32]>,
    /// Absolute expiry for reaching BINDING.
    pub negotiation_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub bound_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Negotiation {
    /// Permitted bounds for `required_consensus_count`:
    /// [⌊n/2⌋ + 1, n] for `n` participants.
    #[must_use]
    pub fn consensus_bounds(participant_count: usize) -> (usize, usize) {
        (participant_count / 2 + 1, participant_count)
    }

    /// Validate a requested consensus count against the participant count.
    ///
    /// # Errors
    /// Returns [`AccordError::ConsensusBoundsError`] outside
    /// [majority, participant count].
    pub fn validate_consensus_count(participant_count: usize, requested: usize) -> Result<()> {
        let (min, max) = Self::consensus_bounds(participant_count);
        if requested < min || requested > max {
            return Err(AccordError::ConsensusBoundsError {
                requested,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Move to `target`, enforcing monotonicity. A forbidden transition
    /// indicates an engine bug, not caller error.
    ///
    /// # Errors
    /// Returns [`AccordError::InvalidState`] for a forbidden transition.
    pub fn transition_to(&mut self, target: NegotiationStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(AccordError::InvalidState {
                operation: "transition",
                status: self.status,
            });
        }
        self.status = target;
        Ok(())
    }

    #[must_use]
    pub fn is_participant(&self, principal: &PrincipalId) -> bool {
        self.participants.contains(principal)
    }

    #[must_use]
    pub fn has_joined(&self, principal: &PrincipalId) -> bool {
        self.joined.contains(principal)
    }

    #[must_use]
    pub fn all_joined(&self) -> bool {
        self.joined.len() == self.participants.len()
    }

    #[must_use]
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.negotiation_deadline
    }

    /// Acceptances at the current terms version sharing the given hash.
    #[must_use]
    pub fn acceptance_count_for(&self, terms_hash: &[u8; 32]) -> usize {
        self.acceptances
            .values()
            .filter(|a| a.terms_version == self.terms_version && a.terms_hash == *terms_hash)
            .count()
    }

    /// Every consensus participant has a stored finalization signature.
    #[must_use]
    pub fn fully_finalized(&self) -> bool {
        !self.consensus_participants.is_empty()
            && self
                .consensus_participants
                .iter()
                .all(|p| self.finalizations.contains_key(p))
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Negotiation {
    /// A two-party negotiation in INITIATED state with dummy keys.
    pub fn dummy(creator: PrincipalId, other: PrincipalId, terms: Value) -> Self {
        let now = Utc::now();
        let mut participant_keys = BTreeMap::new();
        participant_keys.insert(creator, [0u8; 32]);
        participant_keys.insert(other, [1u8; 32]);
        Self {
            negotiation_id: NegotiationId::new(),
            creator_id: creator,
            participants: vec![creator, other],
            participant_keys,
            joined: BTreeSet::from([creator]),
            status: NegotiationStatus::Initiated,
            current_terms: terms,
            terms_version: 1,
            required_consensus_count: 2,
            acceptances: BTreeMap::new(),
            finalizations: BTreeMap::new(),
            consensus_hash: None,
            consensus_participants: Vec::new(),
            binding_hash: None,
            negotiation_deadline: now + chrono::Duration::hours(1),
            created_at: now,
            bound_at: None,
            disputed_at: None,
            withdrawn_at: None,
            expired_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
