//! The trust-event ledger: one immutable hash chain per actor.
//!
//! Trust deltas are bounded twice: |Δ| ≤ 0.2 per event, and the
//! cumulative |Δ| between one (actor, subject) pair inside a sliding
//! 30-day window may not exceed 20% of the trust range. The rate limit
//! is enforced here, at the ledger, so no caller can route around it.
//!
//! Resolution events reference the appeal that produced them; the
//! original event's `resolved_at` stamp sits outside the hashed body, so
//! stamping it does not break the chain.

use std::collections::HashMap;

use accord_crypto::{trust_event_content_hash, verify_trust_chain};
use accord_types::{
    AccordError, AppealId, GENESIS_HASH, PrincipalId, Result, TrustEvent, TrustEventId,
    TrustEventType, canon, constants,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};

/// Append-only trust-event store with per-actor chains.
#[derive(Default)]
pub struct TrustLedger {
    chains: HashMap<PrincipalId, Vec<TrustEvent>>,
}

impl TrustLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current head hash of an actor's chain (zero before any event).
    #[must_use]
    pub fn head(&self, actor: &PrincipalId) -> [u8; 32] {
        self.chains
            .get(actor)
            .and_then(|c| c.last())
            .map_or(GENESIS_HASH, |e| e.content_hash)
    }

    /// The actor's full chain, genesis first.
    #[must_use]
    pub fn chain(&self, actor: &PrincipalId) -> &[TrustEvent] {
        self.chains.get(actor).map_or(&[], Vec::as_slice)
    }

    /// Cumulative |Δ| between `actor` and `subject` in the rate window
    /// ending at `now`.
    #[must_use]
    pub fn window_total(
        &self,
        actor: &PrincipalId,
        subject: &PrincipalId,
        now: DateTime<Utc>,
    ) -> Decimal {
        let window_start = now - Duration::days(constants::TRUST_RATE_WINDOW_DAYS);
        self.chain(actor)
            .iter()
            .filter(|e| e.subject_id == *subject && e.created_at > window_start)
            .map(|e| e.trust_delta.abs())
            .sum()
    }

    /// Check whether a prospective delta would pass the per-event bound
    /// and the relationship's 30-day budget, without recording anything.
    ///
    /// # Errors
    /// - [`AccordError::TrustDeltaOutOfBounds`] beyond |Δ| ≤ 0.2.
    /// - [`AccordError::TrustRateLimited`] when the relationship's
    ///   30-day budget is exhausted.
    pub fn check_rate(
        &self,
        actor: PrincipalId,
        subject: PrincipalId,
        trust_delta: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        TrustEvent::validate_delta(trust_delta)?;
        if self.window_total(&actor, &subject, now) + trust_delta.abs()
            > constants::monthly_trust_cap()
        {
            return Err(AccordError::TrustRateLimited { actor, subject });
        }
        Ok(())
    }

    /// Record a trust event on the actor's chain.
    ///
    /// # Errors
    /// - [`AccordError::TrustDeltaOutOfBounds`] beyond |Δ| ≤ 0.2.
    /// - [`AccordError::TrustRateLimited`] when the relationship's
    ///   30-day budget is exhausted.
    pub fn record(
        &mut self,
        actor: PrincipalId,
        subject: PrincipalId,
        event_type: TrustEventType,
        trust_delta: Decimal,
        context: Value,
    ) -> Result<TrustEvent> {
        let now = Utc::now();
        self.check_rate(actor, subject, trust_delta, now)?;

        let mut event = TrustEvent {
            event_id: TrustEventId::new(),
            actor_id: actor,
            subject_id: subject,
            event_type,
            trust_delta,
            context,
            content_hash: [0u8; 32],
            previous_hash: self.head(&actor),
            created_at: now,
            resolved_at: None,
        };
        event.content_hash = trust_event_content_hash(&event)?;
        self.chains.entry(actor).or_default().push(event.clone());
        tracing::debug!(
            actor = %actor,
            subject = %subject,
            event_type = %event_type,
            trust_delta = %canon::canon_delta(trust_delta),
            "trust event recorded"
        );
        Ok(event)
    }

    /// Record the CONFLICT event a dispute produces, with the default
    /// dispute delta.
    ///
    /// # Errors
    /// See [`TrustLedger::record`].
    pub fn record_conflict(
        &mut self,
        actor: PrincipalId,
        subject: PrincipalId,
        context: Value,
    ) -> Result<TrustEvent> {
        self.record(
            actor,
            subject,
            TrustEventType::Conflict,
            constants::dispute_trust_delta(),
            context,
        )
    }

    /// Append a resolution event referencing `appeal_id` and stamp the
    /// original event's `resolved_at`.
    ///
    /// The resolution's event type follows the delta's sign: positive →
    /// ALIGNMENT, negative → DIVERGENCE, zero → INTERACTION.
    ///
    /// # Errors
    /// - [`AccordError::TrustEventNotFound`] for an unknown event.
    /// - Bound and rate-limit errors from [`TrustLedger::record`].
    pub fn resolve(
        &mut self,
        actor: PrincipalId,
        event_id: TrustEventId,
        resolution_delta: Decimal,
        appeal_id: AppealId,
    ) -> Result<TrustEvent> {
        let subject = self
            .chain(&actor)
            .iter()
            .find(|e| e.event_id == event_id)
            .map(|e| e.subject_id)
            .ok_or(AccordError::TrustEventNotFound(event_id))?;

        let event_type = if resolution_delta > Decimal::ZERO {
            TrustEventType::Alignment
        } else if resolution_delta < Decimal::ZERO {
            TrustEventType::Divergence
        } else {
            TrustEventType::Interaction
        };

        let resolution = self.record(
            actor,
            subject,
            event_type,
            resolution_delta,
            json!({
                "appeal_id": appeal_id.canonical(),
                "resolves": event_id.canonical(),
            }),
        )?;

        let resolved_at = resolution.created_at;
        if let Some(original) = self
            .chains
            .get_mut(&actor)
            .and_then(|c| c.iter_mut().find(|e| e.event_id == event_id))
        {
            original.resolved_at = Some(resolved_at);
        }
        Ok(resolution)
    }

    /// Replay an actor's chain from genesis against the current head.
    #[must_use]
    pub fn verify(&self, actor: &PrincipalId) -> bool {
        verify_trust_chain(&self.head(actor), self.chain(actor))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
