//! The negotiation engine: every protocol transition, linearized.
//!
//! Each transition is a transaction: snapshot → validate → mutate →
//! commit → append receipts. Everything that can reject the transition
//! — precondition checks and the version-checked store commit — runs
//! before anything lands on the append-only ledgers, so a rejected
//! transition changes nothing: no state, no messages, no receipts. The
//! engine borrow spans the whole transition; nothing is externally
//! observable until its receipts have been written.
//!
//! The engine is the exclusive writer for its negotiations (the "host"
//! role); other components read. Deadlines are also enforced lazily here
//! so the protocol stays correct when no scheduler is running.

use accord_crypto::SystemSigner;
use accord_ledger::{ReceiptLedger, TrustLedger};
use accord_types::{
    ACCEPTANCE_FORM, Acceptance, AccordError, Appeal, CoreConfig, FINALIZATION_FORM, Finalization,
    MessageKind, Negotiation, NegotiationId, NegotiationMessage, NegotiationStatus, PrincipalId,
    PublicKeyBytes, ReceiptAction, Result, TrustEvent, canon, constants, message,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::appeals::AppealDesk;
use crate::consensus;
use crate::keyring::KeyRing;
use crate::store::NegotiationStore;

/// Everything a dispute produces in one atomic step.
#[derive(Debug, Clone)]
pub struct DisputeOutcome {
    pub negotiation: Negotiation,
    pub appeal: Appeal,
    pub trust_event: TrustEvent,
}

/// The authoritative coordinator for negotiations on this host.
pub struct NegotiationEngine {
    config: CoreConfig,
    store: NegotiationStore,
    keyring: KeyRing,
    receipts: ReceiptLedger,
    trust: TrustLedger,
    appeals: AppealDesk,
}

impl NegotiationEngine {
    /// Build an engine from configuration. A configured system signing
    /// key is decoded here; a malformed one fails fast.
    ///
    /// # Errors
    /// Returns [`AccordError::InvalidSystemKey`] for a broken key.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let signer = match &config.system_signing_key {
            Some(encoded) => Some(SystemSigner::from_base64(encoded)?),
            None => None,
        };
        Ok(Self {
            config,
            store: NegotiationStore::new(),
            keyring: KeyRing::new(),
            receipts: ReceiptLedger::new(signer),
            trust: TrustLedger::new(),
            appeals: AppealDesk::new(),
        })
    }

    /// Register a principal's Ed25519 public key.
    ///
    /// # Errors
    /// Returns [`AccordError::KeyAlreadyRegistered`] on a conflicting key.
    pub fn register_principal(
        &mut self,
        principal_id: PrincipalId,
        public_key: PublicKeyBytes,
    ) -> Result<()> {
        self.keyring.register(principal_id, public_key)
    }

    // =====================================================================
    // Transitions
    // =====================================================================

    /// Create a negotiation. The creator joins implicitly; every listed
    /// participant's public key is snapshotted and frozen for this
    /// negotiation's lifetime.
    ///
    /// # Errors
    /// - [`AccordError::TooFewParticipants`] below two distinct parties.
    /// - [`AccordError::PermissionDenied`] when the creator is not listed.
    /// - [`AccordError::ConsensusBoundsError`] outside [majority, all].
    /// - [`AccordError::DeadlinePassed`] for a deadline not in the future.
    /// - [`AccordError::KeyNotRegistered`] for any key-less participant.
    pub fn create(
        &mut self,
        creator: PrincipalId,
        participants: Vec<PrincipalId>,
        initial_terms: Value,
        required_consensus_count: Option<usize>,
        deadline: DateTime<Utc>,
    ) -> Result<Negotiation> {
        let mut distinct = Vec::new();
        for p in participants {
            if !distinct.contains(&p) {
                distinct.push(p);
            }
        }
        if distinct.len() < constants::MIN_PARTICIPANTS {
            return Err(AccordError::TooFewParticipants {
                count: distinct.len(),
            });
        }
        if !distinct.contains(&creator) {
            return Err(AccordError::PermissionDenied {
                principal: creator,
                reason: "creator must be a listed participant".into(),
            });
        }
        let required = required_consensus_count.unwrap_or(distinct.len());
        Negotiation::validate_consensus_count(distinct.len(), required)?;

        let negotiation_id = NegotiationId::new();
        let now = Utc::now();
        if deadline <= now {
            return Err(AccordError::DeadlinePassed(negotiation_id));
        }

        let mut participant_keys = std::collections::BTreeMap::new();
        for p in &distinct {
            participant_keys.insert(*p, self.keyring.public_key(p)?);
        }
        let terms_hash = consensus::terms_hash(&initial_terms)?;

        let negotiation = Negotiation {
            negotiation_id,
            creator_id: creator,
            participants: distinct.clone(),
            participant_keys,
            joined: std::collections::BTreeSet::from([creator]),
            status: NegotiationStatus::Initiated,
            current_terms: initial_terms.clone(),
            terms_version: 1,
            required_consensus_count: required,
            acceptances: std::collections::BTreeMap::new(),
            finalizations: std::collections::BTreeMap::new(),
            consensus_hash: None,
            consensus_participants: Vec::new(),
            binding_hash: None,
            negotiation_deadline: deadline,
            created_at: now,
            bound_at: None,
            disputed_at: None,
            withdrawn_at: None,
            expired_at: None,
        };

        self.store.insert(negotiation.clone())?;

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("participant_count".into(), json!(distinct.len()));
        metadata.insert("required_consensus_count".into(), json!(required));
        metadata.insert("terms_version".into(), json!(1));
        metadata.insert("terms_hash".into(), json!(canon::canon_hash(&terms_hash)));
        metadata.insert("deadline".into(), json!(canon::canon_timestamp(deadline)));
        self.receipts
            .append(creator, ReceiptAction::CreateNegotiation, metadata)?;

        let payload = canon::to_canonical_bytes(&json!({
            "negotiation_id": negotiation_id.canonical(),
            "terms": initial_terms,
            "terms_version": 1,
        }))?;
        self.store.log_message(NegotiationMessage::unsigned(
            negotiation_id,
            creator,
            MessageKind::Offer,
            payload,
        ));
        tracing::info!(
            negotiation = %negotiation_id,
            creator = %creator,
            participants = distinct.len(),
            required_consensus = required,
            "negotiation created"
        );
        Ok(negotiation)
    }

    /// Join a negotiation as a listed participant. The first join moves
    /// INITIATED → NEGOTIATING; later participants keep joining until
    /// everyone has.
    ///
    /// # Errors
    /// - [`AccordError::InvalidState`] outside INITIATED / NEGOTIATING.
    /// - [`AccordError::PermissionDenied`] for strangers, the creator, or
    ///   a double join.
    /// - [`AccordError::DeadlinePassed`] after the deadline.
    pub fn join(
        &mut self,
        negotiation_id: NegotiationId,
        principal: PrincipalId,
    ) -> Result<Negotiation> {
        let (mut negotiation, version) = self.store.snapshot(negotiation_id)?;
        match negotiation.status {
            NegotiationStatus::Initiated | NegotiationStatus::Negotiating => {}
            NegotiationStatus::Binding => {
                return Err(AccordError::BindingImmutable(negotiation_id));
            }
            status => {
                return Err(AccordError::InvalidState {
                    operation: "join",
                    status,
                });
            }
        }
        if !negotiation.is_participant(&principal) {
            return Err(AccordError::PermissionDenied {
                principal,
                reason: "not a listed participant".into(),
            });
        }
        if negotiation.has_joined(&principal) {
            return Err(AccordError::PermissionDenied {
                principal,
                reason: "already joined".into(),
            });
        }
        let now = Utc::now();
        if negotiation.deadline_passed(now) {
            return Err(AccordError::DeadlinePassed(negotiation_id));
        }

        negotiation.joined.insert(principal);
        if negotiation.status == NegotiationStatus::Initiated {
            // First join opens the bargaining phase.
            negotiation.transition_to(NegotiationStatus::Negotiating)?;
        }

        let snapshot = negotiation.clone();
        self.store.commit(negotiation, version)?;

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("joined_count".into(), json!(snapshot.joined.len()));
        metadata.insert(
            "participant_count".into(),
            json!(snapshot.participants.len()),
        );
        metadata.insert("join_policy".into(), json!("first-join"));
        self.receipts
            .append(principal, ReceiptAction::JoinNegotiation, metadata)?;

        let payload = canon::to_canonical_bytes(&json!({
            "negotiation_id": negotiation_id.canonical(),
            "principal_id": principal.canonical(),
        }))?;
        self.store.log_message(NegotiationMessage::unsigned(
            negotiation_id,
            principal,
            MessageKind::Join,
            payload,
        ));
        Ok(snapshot)
    }

    /// Offer new terms: bumps `terms_version` and clears all acceptances.
    ///
    /// # Errors
    /// - [`AccordError::InvalidState`] outside NEGOTIATING.
    /// - [`AccordError::BindingImmutable`] on a BINDING negotiation.
    /// - [`AccordError::PermissionDenied`] for non-participants.
    /// - [`AccordError::DeadlinePassed`] after the deadline.
    pub fn offer(
        &mut self,
        negotiation_id: NegotiationId,
        principal: PrincipalId,
        new_terms: Value,
    ) -> Result<Negotiation> {
        let (mut negotiation, version) = self.store.snapshot(negotiation_id)?;
        Self::require_status(&negotiation, NegotiationStatus::Negotiating, "offer")?;
        Self::require_participant(&negotiation, principal)?;
        let now = Utc::now();
        if negotiation.deadline_passed(now) {
            return Err(AccordError::DeadlinePassed(negotiation_id));
        }
        let terms_hash = consensus::terms_hash(&new_terms)?;

        negotiation.current_terms = new_terms.clone();
        negotiation.terms_version += 1;
        negotiation.acceptances.clear();
        let terms_version = negotiation.terms_version;

        let snapshot = negotiation.clone();
        self.store.commit(negotiation, version)?;

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("terms_version".into(), json!(terms_version));
        metadata.insert("terms_hash".into(), json!(canon::canon_hash(&terms_hash)));
        self.receipts
            .append(principal, ReceiptAction::SendOffer, metadata)?;

        let payload = canon::to_canonical_bytes(&json!({
            "negotiation_id": negotiation_id.canonical(),
            "terms": new_terms,
            "terms_version": terms_version,
        }))?;
        self.store.log_message(NegotiationMessage::unsigned(
            negotiation_id,
            principal,
            MessageKind::Offer,
            payload,
        ));
        tracing::debug!(
            negotiation = %negotiation_id,
            terms_version,
            "offer recorded; acceptances cleared"
        );
        Ok(snapshot)
    }

    /// Accept the current terms with a signature over the acceptance form
    /// `{negotiation_id, terms_version, terms_hash}`. Reaching the
    /// required count of identical acceptances moves the negotiation to
    /// CONSENSUS_REACHED and derives the consensus hash.
    ///
    /// # Errors
    /// - [`AccordError::InvalidState`] outside NEGOTIATING.
    /// - [`AccordError::PermissionDenied`] for non-participants.
    /// - [`AccordError::DeadlinePassed`] after the deadline.
    /// - [`AccordError::InvalidSignature`] when the signature does not
    ///   verify over the exact canonical bytes — including signatures
    ///   made over a prior terms version.
    pub fn accept(
        &mut self,
        negotiation_id: NegotiationId,
        principal: PrincipalId,
        signature: &[u8],
    ) -> Result<Negotiation> {
        let (mut negotiation, version) = self.store.snapshot(negotiation_id)?;
        Self::require_status(&negotiation, NegotiationStatus::Negotiating, "accept")?;
        Self::require_participant(&negotiation, principal)?;
        let now = Utc::now();
        if negotiation.deadline_passed(now) {
            return Err(AccordError::DeadlinePassed(negotiation_id));
        }

        let public_key = *negotiation
            .participant_keys
            .get(&principal)
            .ok_or(AccordError::KeyNotRegistered(principal))?;
        let terms_hash = consensus::terms_hash(&negotiation.current_terms)?;
        let payload = message::acceptance_signing_payload(
            negotiation_id,
            negotiation.terms_version,
            &terms_hash,
        )?;
        if !accord_crypto::verify(&public_key, &payload, signature) {
            self.audit_rejected_signature(principal, negotiation_id, ACCEPTANCE_FORM)?;
            return Err(AccordError::InvalidSignature {
                principal,
                form: ACCEPTANCE_FORM,
            });
        }

        negotiation.acceptances.insert(
            principal,
            Acceptance {
                terms_version: negotiation.terms_version,
                terms_hash,
                signature: signature.to_vec(),
                accepted_at: now,
            },
        );

        let candidates = consensus::detect(&negotiation);
        let mut consensus_reached = false;
        let mut conflict_losers = Vec::new();
        if let Some((winner, losers)) = consensus::select_winner(candidates) {
            for loser in &losers {
                // Invalidate the losing acceptances.
                negotiation
                    .acceptances
                    .retain(|_, a| a.terms_hash != loser.terms_hash);
                conflict_losers.push(canon::canon_hash(&loser.terms_hash));
            }
            let signatures: Vec<Vec<u8>> = winner
                .contributors
                .iter()
                .filter_map(|p| negotiation.acceptances.get(p))
                .map(|a| a.signature.clone())
                .collect();
            let consensus_hash = consensus::consensus_hash(
                negotiation_id,
                negotiation.terms_version,
                &winner.terms_hash,
                &signatures,
            )?;
            negotiation.transition_to(NegotiationStatus::ConsensusReached)?;
            negotiation.consensus_hash = Some(consensus_hash);
            negotiation.consensus_participants = winner.contributors;
            consensus_reached = true;
        }

        let snapshot = negotiation.clone();
        self.store.commit(negotiation, version)?;

        if !conflict_losers.is_empty() {
            let mut metadata = Map::new();
            metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
            metadata.insert("invalidated_terms_hashes".into(), json!(conflict_losers));
            self.receipts.append(
                principal,
                ReceiptAction::ConsensusConflictResolved,
                metadata,
            )?;
        }

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("terms_version".into(), json!(snapshot.terms_version));
        metadata.insert("terms_hash".into(), json!(canon::canon_hash(&terms_hash)));
        metadata.insert("consensus_reached".into(), json!(consensus_reached));
        self.receipts
            .append(principal, ReceiptAction::AcceptTerms, metadata)?;

        self.store.log_message(NegotiationMessage::signed(
            negotiation_id,
            principal,
            MessageKind::Accept,
            payload,
            signature.to_vec(),
        ));
        if consensus_reached {
            tracing::info!(negotiation = %negotiation_id, "consensus reached");
        }
        Ok(snapshot)
    }

    /// Finalize with a signature over `{negotiation_id, consensus_hash}`.
    /// When every consensus participant has finalized, the negotiation
    /// becomes BINDING and the binding hash is derived.
    ///
    /// # Errors
    /// - [`AccordError::InvalidState`] outside CONSENSUS_REACHED.
    /// - [`AccordError::PermissionDenied`] for principals whose acceptance
    ///   did not contribute to consensus.
    /// - [`AccordError::DeadlinePassed`] after the deadline.
    /// - [`AccordError::InvalidSignature`] on verification failure.
    pub fn finalize(
        &mut self,
        negotiation_id: NegotiationId,
        principal: PrincipalId,
        signature: &[u8],
    ) -> Result<Negotiation> {
        let (mut negotiation, version) = self.store.snapshot(negotiation_id)?;
        Self::require_status(&negotiation, NegotiationStatus::ConsensusReached, "finalize")?;
        if !negotiation.consensus_participants.contains(&principal) {
            return Err(AccordError::PermissionDenied {
                principal,
                reason: "acceptance did not contribute to consensus".into(),
            });
        }
        let now = Utc::now();
        if negotiation.deadline_passed(now) {
            return Err(AccordError::DeadlinePassed(negotiation_id));
        }

        let public_key = *negotiation
            .participant_keys
            .get(&principal)
            .ok_or(AccordError::KeyNotRegistered(principal))?;
        let consensus_hash = negotiation
            .consensus_hash
            .ok_or_else(|| AccordError::StorageIntegrity {
                reason: format!("{negotiation_id} is CONSENSUS_REACHED without a consensus hash"),
            })?;
        let payload = message::finalization_signing_payload(negotiation_id, &consensus_hash)?;
        if !accord_crypto::verify(&public_key, &payload, signature) {
            self.audit_rejected_signature(principal, negotiation_id, FINALIZATION_FORM)?;
            return Err(AccordError::InvalidSignature {
                principal,
                form: FINALIZATION_FORM,
            });
        }

        negotiation.finalizations.insert(
            principal,
            Finalization {
                signature: signature.to_vec(),
                finalized_at: now,
            },
        );

        let mut became_binding = false;
        if negotiation.fully_finalized() {
            let signatures: Vec<Vec<u8>> = negotiation
                .finalizations
                .values()
                .map(|f| f.signature.clone())
                .collect();
            negotiation.binding_hash = Some(consensus::binding_hash(&consensus_hash, &signatures)?);
            negotiation.transition_to(NegotiationStatus::Binding)?;
            negotiation.bound_at = Some(now);
            became_binding = true;
        }

        let snapshot = negotiation.clone();
        self.store.commit(negotiation, version)?;

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert(
            "consensus_hash".into(),
            json!(canon::canon_hash(&consensus_hash)),
        );
        self.receipts
            .append(principal, ReceiptAction::FinalizeCommitment, metadata)?;

        if became_binding {
            let binding_hash =
                snapshot
                    .binding_hash
                    .ok_or_else(|| AccordError::StorageIntegrity {
                        reason: format!("{negotiation_id} reached BINDING without a binding hash"),
                    })?;
            let mut metadata = Map::new();
            metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
            metadata.insert(
                "consensus_hash".into(),
                json!(canon::canon_hash(&consensus_hash)),
            );
            metadata.insert(
                "binding_hash".into(),
                json!(canon::canon_hash(&binding_hash)),
            );
            self.receipts
                .append(principal, ReceiptAction::BindingReached, metadata)?;
        }

        self.store.log_message(NegotiationMessage::signed(
            negotiation_id,
            principal,
            MessageKind::Finalize,
            payload,
            signature.to_vec(),
        ));
        if became_binding {
            tracing::info!(negotiation = %negotiation_id, "binding reached");
        }
        Ok(snapshot)
    }

    /// Withdraw before consensus. Forbidden from CONSENSUS_REACHED on.
    ///
    /// # Errors
    /// - [`AccordError::BindingImmutable`] on a BINDING negotiation.
    /// - [`AccordError::InvalidState`] from CONSENSUS_REACHED or any
    ///   terminal state.
    /// - [`AccordError::PermissionDenied`] for non-participants.
    pub fn withdraw(
        &mut self,
        negotiation_id: NegotiationId,
        principal: PrincipalId,
    ) -> Result<Negotiation> {
        let (mut negotiation, version) = self.store.snapshot(negotiation_id)?;
        match negotiation.status {
            NegotiationStatus::Initiated | NegotiationStatus::Negotiating => {}
            NegotiationStatus::Binding => {
                return Err(AccordError::BindingImmutable(negotiation_id));
            }
            status => {
                return Err(AccordError::InvalidState {
                    operation: "withdraw",
                    status,
                });
            }
        }
        Self::require_participant(&negotiation, principal)?;

        let prior_status = negotiation.status;
        negotiation.transition_to(NegotiationStatus::Withdrawn)?;
        negotiation.withdrawn_at = Some(Utc::now());

        let snapshot = negotiation.clone();
        self.store.commit(negotiation, version)?;

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("prior_status".into(), json!(prior_status.to_string()));
        self.receipts
            .append(principal, ReceiptAction::Withdraw, metadata)?;

        let payload = canon::to_canonical_bytes(&json!({
            "negotiation_id": negotiation_id.canonical(),
            "principal_id": principal.canonical(),
        }))?;
        self.store.log_message(NegotiationMessage::unsigned(
            negotiation_id,
            principal,
            MessageKind::Withdraw,
            payload,
        ));
        Ok(snapshot)
    }

    /// Dispute a BINDING agreement: the only operation BINDING permits.
    /// Atomically creates the CONFLICT trust event and its paired appeal;
    /// the binding hash and terms are preserved untouched.
    ///
    /// # Errors
    /// - [`AccordError::InvalidState`] outside BINDING.
    /// - [`AccordError::PermissionDenied`] for non-participants.
    /// - Trust bound / rate-limit errors from the ledger.
    pub fn dispute(
        &mut self,
        negotiation_id: NegotiationId,
        principal: PrincipalId,
        reason: &str,
    ) -> Result<DisputeOutcome> {
        let (mut negotiation, version) = self.store.snapshot(negotiation_id)?;
        if negotiation.status != NegotiationStatus::Binding {
            return Err(AccordError::InvalidState {
                operation: "dispute",
                status: negotiation.status,
            });
        }
        Self::require_participant(&negotiation, principal)?;

        let binding_hash = negotiation
            .binding_hash
            .ok_or_else(|| AccordError::StorageIntegrity {
                reason: format!("{negotiation_id} is BINDING without a binding hash"),
            })?;

        // Subject: first other participant in canonical (sorted) order.
        let mut sorted = negotiation.participants.clone();
        sorted.sort();
        let subject = sorted
            .iter()
            .find(|p| **p != principal)
            .copied()
            .ok_or_else(|| AccordError::StorageIntegrity {
                reason: format!("{negotiation_id} has no participant besides the disputer"),
            })?;

        let context = json!({
            "negotiation_id": negotiation_id.canonical(),
            "binding_hash": canon::canon_hash(&binding_hash),
            "terms": negotiation.current_terms,
        });
        // Pre-flight the trust ledger's own checks; nothing may fail
        // once the status change has committed.
        canon::to_canonical_bytes(&context)?;
        let now = Utc::now();
        self.trust
            .check_rate(principal, subject, constants::dispute_trust_delta(), now)?;

        negotiation.transition_to(NegotiationStatus::Disputed)?;
        negotiation.disputed_at = Some(now);

        let snapshot = negotiation.clone();
        self.store.commit(negotiation, version)?;

        let trust_event = self
            .trust
            .record_conflict(principal, subject, context.clone())?;
        let appeal = self.appeals.open(
            trust_event.event_id,
            principal,
            subject,
            reason.to_string(),
            context,
            now,
        );

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("appeal_id".into(), json!(appeal.appeal_id.canonical()));
        metadata.insert(
            "trust_event_id".into(),
            json!(trust_event.event_id.canonical()),
        );
        metadata.insert(
            "binding_hash".into(),
            json!(canon::canon_hash(&binding_hash)),
        );
        self.receipts
            .append(principal, ReceiptAction::DisputeBinding, metadata)?;

        let payload = canon::to_canonical_bytes(&json!({
            "negotiation_id": negotiation_id.canonical(),
            "principal_id": principal.canonical(),
            "reason": reason,
        }))?;
        self.store.log_message(NegotiationMessage::unsigned(
            negotiation_id,
            principal,
            MessageKind::Dispute,
            payload,
        ));
        tracing::warn!(
            negotiation = %negotiation_id,
            appeal = %appeal.appeal_id,
            disputer = %principal,
            "binding disputed"
        );
        Ok(DisputeOutcome {
            negotiation: snapshot,
            appeal,
            trust_event,
        })
    }

    /// Expire an overdue negotiation. Engine-internal, invoked by the
    /// scheduler. Idempotent: BINDING and terminal negotiations, and
    /// negotiations still inside their deadline, are a no-op.
    ///
    /// # Errors
    /// Propagates receipt-append and commit failures.
    pub fn expire(
        &mut self,
        negotiation_id: NegotiationId,
        now: DateTime<Utc>,
    ) -> Result<Option<Negotiation>> {
        let (mut negotiation, version) = self.store.snapshot(negotiation_id)?;
        if !negotiation.status.is_expirable() || !negotiation.deadline_passed(now) {
            return Ok(None);
        }

        let prior_status = negotiation.status;
        negotiation.transition_to(NegotiationStatus::Expired)?;
        negotiation.expired_at = Some(now);

        let snapshot = negotiation.clone();
        self.store.commit(negotiation, version)?;

        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("prior_status".into(), json!(prior_status.to_string()));
        // Expiry has no acting participant; it lands on the creator's chain.
        self.receipts.append(
            snapshot.creator_id,
            ReceiptAction::NegotiationExpired,
            metadata,
        )?;

        tracing::info!(negotiation = %negotiation_id, %prior_status, "negotiation expired");
        Ok(Some(snapshot))
    }

    // =====================================================================
    // Reads and component access
    // =====================================================================

    /// Snapshot a negotiation's current state.
    ///
    /// # Errors
    /// Returns [`AccordError::NegotiationNotFound`] for unknown IDs.
    pub fn negotiation(&self, negotiation_id: NegotiationId) -> Result<Negotiation> {
        Ok(self.store.snapshot(negotiation_id)?.0)
    }

    /// The append-only message log for a negotiation.
    #[must_use]
    pub fn messages(&self, negotiation_id: &NegotiationId) -> &[NegotiationMessage] {
        self.store.messages(negotiation_id)
    }

    /// Negotiations the scheduler should expire at `now`.
    #[must_use]
    pub fn expirable(&self, now: DateTime<Utc>) -> Vec<NegotiationId> {
        self.store.expirable(now)
    }

    #[must_use]
    pub fn receipts(&self) -> &ReceiptLedger {
        &self.receipts
    }

    #[must_use]
    pub fn receipts_mut(&mut self) -> &mut ReceiptLedger {
        &mut self.receipts
    }

    #[must_use]
    pub fn trust(&self) -> &TrustLedger {
        &self.trust
    }

    #[must_use]
    pub fn appeals(&self) -> &AppealDesk {
        &self.appeals
    }

    /// Split borrow for appeal operations that also write receipts and
    /// trust events.
    pub fn appeals_parts(
        &mut self,
    ) -> (&mut AppealDesk, &mut ReceiptLedger, &mut TrustLedger) {
        (&mut self.appeals, &mut self.receipts, &mut self.trust)
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn require_status(
        negotiation: &Negotiation,
        expected: NegotiationStatus,
        operation: &'static str,
    ) -> Result<()> {
        if negotiation.status == expected {
            return Ok(());
        }
        if negotiation.status == NegotiationStatus::Binding {
            return Err(AccordError::BindingImmutable(negotiation.negotiation_id));
        }
        Err(AccordError::InvalidState {
            operation,
            status: negotiation.status,
        })
    }

    fn require_participant(negotiation: &Negotiation, principal: PrincipalId) -> Result<()> {
        if negotiation.is_participant(&principal) {
            return Ok(());
        }
        Err(AccordError::PermissionDenied {
            principal,
            reason: "not a listed participant".into(),
        })
    }

    fn audit_rejected_signature(
        &mut self,
        principal: PrincipalId,
        negotiation_id: NegotiationId,
        form: &'static str,
    ) -> Result<()> {
        if !self.config.audit_rejected_signatures {
            return Ok(());
        }
        let mut metadata = Map::new();
        metadata.insert("negotiation_id".into(), json!(negotiation_id.canonical()));
        metadata.insert("form".into(), json!(form));
        self.receipts
            .append(principal, ReceiptAction::SignatureRejected, metadata)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use accord_crypto::TestKeypair;
    use chrono::Duration;

    use super::*;

    struct Party {
        id: PrincipalId,
        keys: TestKeypair,
    }

    fn party(engine: &mut NegotiationEngine) -> Party {
        let id = PrincipalId::new();
        let keys = TestKeypair::generate();
        engine.register_principal(id, keys.public_key()).unwrap();
        Party { id, keys }
    }

    fn engine() -> NegotiationEngine {
        NegotiationEngine::new(CoreConfig::default()).unwrap()
    }

    fn sign_accept(engine: &NegotiationEngine, nid: NegotiationId, party: &Party) -> Vec<u8> {
        let negotiation = engine.negotiation(nid).unwrap();
        let terms_hash = consensus::terms_hash(&negotiation.current_terms).unwrap();
        let payload =
            message::acceptance_signing_payload(nid, negotiation.terms_version, &terms_hash)
                .unwrap();
        party.keys.sign(&payload)
    }

    fn sign_finalize(engine: &NegotiationEngine, nid: NegotiationId, party: &Party) -> Vec<u8> {
        let negotiation = engine.negotiation(nid).unwrap();
        let payload = message::finalization_signing_payload(
            nid,
            &negotiation.consensus_hash.expect("consensus reached"),
        )
        .unwrap();
        party.keys.sign(&payload)
    }

    fn two_party_setup() -> (NegotiationEngine, Party, Party, NegotiationId) {
        let mut engine = engine();
        let a = party(&mut engine);
        let b = party(&mut engine);
        let n = engine
            .create(
                a.id,
                vec![a.id, b.id],
                json!({"action": "apologize", "amount": 500}),
                None,
                Utc::now() + Duration::hours(1),
            )
            .unwrap();
        (engine, a, b, n.negotiation_id)
    }

    #[test]
    fn create_initiates_with_version_one() {
        let (engine, a, _b, nid) = two_party_setup();
        let n = engine.negotiation(nid).unwrap();
        assert_eq!(n.status, NegotiationStatus::Initiated);
        assert_eq!(n.terms_version, 1);
        assert!(n.acceptances.is_empty());
        assert!(n.finalizations.is_empty());
        assert!(n.has_joined(&a.id), "creator joins implicitly");
        // Creation receipt on the creator's chain.
        assert_eq!(
            engine.receipts().chain(&a.id)[0].action,
            ReceiptAction::CreateNegotiation
        );
    }

    #[test]
    fn create_rejects_minority_consensus_without_side_effects() {
        let mut engine = engine();
        let parties: Vec<Party> = (0..5).map(|_| party(&mut engine)).collect();
        let ids: Vec<PrincipalId> = parties.iter().map(|p| p.id).collect();
        let err = engine
            .create(
                ids[0],
                ids.clone(),
                json!({"t": 1}),
                Some(2),
                Utc::now() + Duration::hours(1),
            )
            .unwrap_err();
        assert!(matches!(err, AccordError::ConsensusBoundsError { .. }));
        // No negotiation, no receipts.
        for p in &parties {
            assert!(engine.receipts().chain(&p.id).is_empty());
        }
    }

    #[test]
    fn create_rejects_single_party() {
        let mut engine = engine();
        let a = party(&mut engine);
        let err = engine
            .create(
                a.id,
                vec![a.id],
                json!({}),
                None,
                Utc::now() + Duration::hours(1),
            )
            .unwrap_err();
        assert!(matches!(err, AccordError::TooFewParticipants { count: 1 }));
    }

    #[test]
    fn create_rejects_past_deadline() {
        let mut engine = engine();
        let a = party(&mut engine);
        let b = party(&mut engine);
        let err = engine
            .create(
                a.id,
                vec![a.id, b.id],
                json!({}),
                None,
                Utc::now() - Duration::seconds(1),
            )
            .unwrap_err();
        assert!(matches!(err, AccordError::DeadlinePassed(_)));
    }

    #[test]
    fn create_requires_registered_keys() {
        let mut engine = engine();
        let a = party(&mut engine);
        let unregistered = PrincipalId::new();
        let err = engine
            .create(
                a.id,
                vec![a.id, unregistered],
                json!({}),
                None,
                Utc::now() + Duration::hours(1),
            )
            .unwrap_err();
        assert!(matches!(err, AccordError::KeyNotRegistered(_)));
    }

    #[test]
    fn first_join_opens_negotiating() {
        let (mut engine, _a, b, nid) = two_party_setup();
        let n = engine.join(nid, b.id).unwrap();
        assert_eq!(n.status, NegotiationStatus::Negotiating);
        assert!(n.all_joined());
    }

    #[test]
    fn join_by_stranger_rejected() {
        let (mut engine, _a, _b, nid) = two_party_setup();
        let stranger = PrincipalId::new();
        let err = engine.join(nid, stranger).unwrap_err();
        assert!(matches!(err, AccordError::PermissionDenied { .. }));
    }

    #[test]
    fn double_join_rejected() {
        let (mut engine, _a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let err = engine.join(nid, b.id).unwrap_err();
        assert!(matches!(err, AccordError::PermissionDenied { .. }));
    }

    #[test]
    fn join_after_deadline_rejected() {
        let mut engine = engine();
        let a = party(&mut engine);
        let b = party(&mut engine);
        let n = engine
            .create(
                a.id,
                vec![a.id, b.id],
                json!({}),
                None,
                Utc::now() + Duration::milliseconds(1),
            )
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let err = engine.join(n.negotiation_id, b.id).unwrap_err();
        assert!(matches!(err, AccordError::DeadlinePassed(_)));
    }

    #[test]
    fn offer_bumps_version_and_clears_acceptances() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();

        let sig = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig).unwrap();
        assert_eq!(engine.negotiation(nid).unwrap().acceptances.len(), 1);

        engine
            .offer(nid, b.id, json!({"action": "apologize", "amount": 0}))
            .unwrap();
        let n = engine.negotiation(nid).unwrap();
        assert_eq!(n.terms_version, 2);
        assert!(n.acceptances.is_empty(), "offer clears acceptances");
    }

    #[test]
    fn stale_acceptance_signature_rejected_after_terms_drift() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();

        // A signs and accepts version 1.
        let old_sig = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &old_sig).unwrap();

        // B posts a new offer: version 2, acceptances cleared.
        engine.offer(nid, b.id, json!({"amount": 0})).unwrap();

        // A replays the version-1 signature against version 2.
        let err = engine.accept(nid, a.id, &old_sig).unwrap_err();
        assert!(matches!(
            err,
            AccordError::InvalidSignature {
                form: ACCEPTANCE_FORM,
                ..
            }
        ));
        let n = engine.negotiation(nid).unwrap();
        assert!(n.acceptances.is_empty(), "rejected replay leaves no acceptance");
    }

    #[test]
    fn acceptances_reach_consensus() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();

        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();
        assert_eq!(
            engine.negotiation(nid).unwrap().status,
            NegotiationStatus::Negotiating
        );

        let sig_b = sign_accept(&engine, nid, &b);
        let n = engine.accept(nid, b.id, &sig_b).unwrap();
        assert_eq!(n.status, NegotiationStatus::ConsensusReached);
        assert!(n.consensus_hash.is_some());
        assert_eq!(n.consensus_participants.len(), 2);
    }

    #[test]
    fn garbage_signature_rejected() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let err = engine.accept(nid, a.id, &[0u8; 64]).unwrap_err();
        assert!(matches!(err, AccordError::InvalidSignature { .. }));
    }

    #[test]
    fn finalize_reaches_binding() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();
        let sig_b = sign_accept(&engine, nid, &b);
        engine.accept(nid, b.id, &sig_b).unwrap();

        let fin_a = sign_finalize(&engine, nid, &a);
        let n = engine.finalize(nid, a.id, &fin_a).unwrap();
        assert_eq!(n.status, NegotiationStatus::ConsensusReached);
        assert!(n.binding_hash.is_none());

        let fin_b = sign_finalize(&engine, nid, &b);
        let n = engine.finalize(nid, b.id, &fin_b).unwrap();
        assert_eq!(n.status, NegotiationStatus::Binding);
        assert!(n.bound_at.is_some());
        let binding_hash = n.binding_hash.expect("defined in BINDING");
        assert_ne!(binding_hash, [0u8; 32]);

        // Exactly one BINDING_REACHED receipt across all chains.
        let binding_receipts: usize = [a.id, b.id]
            .iter()
            .map(|p| {
                engine
                    .receipts()
                    .chain(p)
                    .iter()
                    .filter(|r| r.action == ReceiptAction::BindingReached)
                    .count()
            })
            .sum();
        assert_eq!(binding_receipts, 1);
    }

    #[test]
    fn binding_is_immutable_except_dispute() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();
        let sig_b = sign_accept(&engine, nid, &b);
        engine.accept(nid, b.id, &sig_b).unwrap();
        let fin_a = sign_finalize(&engine, nid, &a);
        engine.finalize(nid, a.id, &fin_a).unwrap();
        let fin_b = sign_finalize(&engine, nid, &b);
        engine.finalize(nid, b.id, &fin_b).unwrap();

        assert!(matches!(
            engine.withdraw(nid, a.id).unwrap_err(),
            AccordError::BindingImmutable(_)
        ));
        assert!(matches!(
            engine.offer(nid, a.id, json!({})).unwrap_err(),
            AccordError::BindingImmutable(_)
        ));
        assert!(matches!(
            engine.accept(nid, a.id, &sig_a).unwrap_err(),
            AccordError::BindingImmutable(_)
        ));
        assert!(matches!(
            engine.join(nid, b.id).unwrap_err(),
            AccordError::BindingImmutable(_)
        ));

        // Dispute is permitted, preserves the binding hash, and pairs a
        // CONFLICT event with exactly one appeal.
        let before = engine.negotiation(nid).unwrap().binding_hash;
        let outcome = engine.dispute(nid, b.id, "unmet").unwrap();
        assert_eq!(outcome.negotiation.status, NegotiationStatus::Disputed);
        assert_eq!(outcome.negotiation.binding_hash, before);
        assert_eq!(outcome.appeal.trust_event_id, outcome.trust_event.event_id);
        assert_eq!(engine.appeals().len(), 1);
    }

    #[test]
    fn withdraw_forbidden_after_consensus() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();
        let sig_b = sign_accept(&engine, nid, &b);
        engine.accept(nid, b.id, &sig_b).unwrap();

        let err = engine.withdraw(nid, a.id).unwrap_err();
        assert!(matches!(err, AccordError::InvalidState { .. }));
    }

    #[test]
    fn withdraw_during_negotiating() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let n = engine.withdraw(nid, a.id).unwrap();
        assert_eq!(n.status, NegotiationStatus::Withdrawn);
        assert!(n.withdrawn_at.is_some());
    }

    #[test]
    fn dispute_outside_binding_rejected() {
        let (mut engine, a, _b, nid) = two_party_setup();
        let err = engine.dispute(nid, a.id, "too early").unwrap_err();
        assert!(matches!(err, AccordError::InvalidState { .. }));
    }

    #[test]
    fn expire_overdue_negotiation() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();

        // Still inside the deadline: no-op.
        assert!(engine.expire(nid, Utc::now()).unwrap().is_none());

        let past = Utc::now() + Duration::hours(2);
        let n = engine.expire(nid, past).unwrap().expect("expired");
        assert_eq!(n.status, NegotiationStatus::Expired);
        // Idempotent.
        assert!(engine.expire(nid, past).unwrap().is_none());
        // The expiry receipt lands on the creator's chain.
        assert!(
            engine
                .receipts()
                .chain(&a.id)
                .iter()
                .any(|r| r.action == ReceiptAction::NegotiationExpired)
        );
    }

    #[test]
    fn binding_negotiations_never_expire() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();
        let sig_b = sign_accept(&engine, nid, &b);
        engine.accept(nid, b.id, &sig_b).unwrap();
        let fin_a = sign_finalize(&engine, nid, &a);
        engine.finalize(nid, a.id, &fin_a).unwrap();
        let fin_b = sign_finalize(&engine, nid, &b);
        engine.finalize(nid, b.id, &fin_b).unwrap();

        let far_future = Utc::now() + Duration::days(365);
        assert!(engine.expire(nid, far_future).unwrap().is_none());
        assert_eq!(
            engine.negotiation(nid).unwrap().status,
            NegotiationStatus::Binding
        );
    }

    #[test]
    fn receipt_chains_stay_intact_across_transitions() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();
        engine.offer(nid, b.id, json!({"amount": 250})).unwrap();
        let sig_a2 = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a2).unwrap();

        assert!(engine.receipts().verify_full(&a.id));
        assert!(engine.receipts().verify_full(&b.id));
    }

    #[test]
    fn message_log_tracks_transitions_with_verified_flags() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();

        let log = engine.messages(&nid);
        assert_eq!(log.len(), 3); // create-offer, join, accept
        assert_eq!(log[0].kind, MessageKind::Offer);
        assert!(!log[0].signature_verified);
        assert_eq!(log[2].kind, MessageKind::Accept);
        assert!(log[2].signature_verified);
        assert_eq!(log[2].signature.as_deref(), Some(sig_a.as_slice()));
    }

    #[test]
    fn rejected_transition_leaves_nothing_behind() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let receipts_before: usize = [a.id, b.id]
            .iter()
            .map(|p| engine.receipts().chain(p).len())
            .sum();
        let messages_before = engine.messages(&nid).len();

        let _ = engine.accept(nid, a.id, &[7u8; 64]).unwrap_err();

        let receipts_after: usize = [a.id, b.id]
            .iter()
            .map(|p| engine.receipts().chain(p).len())
            .sum();
        assert_eq!(receipts_before, receipts_after);
        assert_eq!(engine.messages(&nid).len(), messages_before);
    }

    #[test]
    fn three_party_majority_consensus() {
        let mut engine = engine();
        let parties: Vec<Party> = (0..3).map(|_| party(&mut engine)).collect();
        let ids: Vec<PrincipalId> = parties.iter().map(|p| p.id).collect();
        let n = engine
            .create(
                ids[0],
                ids.clone(),
                json!({"split": 3}),
                Some(2),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();
        let nid = n.negotiation_id;
        engine.join(nid, ids[1]).unwrap();
        engine.join(nid, ids[2]).unwrap();

        let sig0 = sign_accept(&engine, nid, &parties[0]);
        engine.accept(nid, ids[0], &sig0).unwrap();
        let sig1 = sign_accept(&engine, nid, &parties[1]);
        let n = engine.accept(nid, ids[1], &sig1).unwrap();
        assert_eq!(n.status, NegotiationStatus::ConsensusReached);
        // Only the two contributors need to finalize.
        assert_eq!(n.consensus_participants.len(), 2);

        let fin0 = sign_finalize(&engine, nid, &parties[0]);
        engine.finalize(nid, ids[0], &fin0).unwrap();
        let fin1 = sign_finalize(&engine, nid, &parties[1]);
        let n = engine.finalize(nid, ids[1], &fin1).unwrap();
        assert_eq!(n.status, NegotiationStatus::Binding);

        // The non-contributor cannot finalize.
        let fin2 = sign_finalize(&engine, nid, &parties[2]);
        let err = engine.finalize(nid, ids[2], &fin2).unwrap_err();
        assert!(matches!(err, AccordError::BindingImmutable(_)));
    }

    #[test]
    fn stored_signatures_reverify_against_canonical_forms() {
        let (mut engine, a, b, nid) = two_party_setup();
        engine.join(nid, b.id).unwrap();
        let sig_a = sign_accept(&engine, nid, &a);
        engine.accept(nid, a.id, &sig_a).unwrap();
        let sig_b = sign_accept(&engine, nid, &b);
        engine.accept(nid, b.id, &sig_b).unwrap();

        let n = engine.negotiation(nid).unwrap();
        for (principal, acceptance) in &n.acceptances {
            let payload = message::acceptance_signing_payload(
                nid,
                acceptance.terms_version,
                &acceptance.terms_hash,
            )
            .unwrap();
            let key = n.participant_keys[principal];
            assert!(accord_crypto::verify(&key, &payload, &acceptance.signature));
        }
    }
}
