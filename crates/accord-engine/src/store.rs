//! Versioned negotiation store with transactional commit semantics.
//!
//! Every transition is a read-validate-mutate-commit cycle: the engine
//! reads a snapshot (clone + version), validates preconditions, mutates
//! the clone, and commits with a version check. A commit that observed a
//! stale version fails with `AC_ERR_400` and changes nothing — dirty
//! reads of in-flight state are never observable.
//!
//! The store also keeps the append-only message log per negotiation.

use std::collections::HashMap;

use accord_types::{AccordError, Negotiation, NegotiationId, NegotiationMessage, Result};
use chrono::{DateTime, Utc};

struct Versioned {
    negotiation: Negotiation,
    version: u64,
}

/// In-memory transactional store for negotiations and their message logs.
#[derive(Default)]
pub struct NegotiationStore {
    entries: HashMap<NegotiationId, Versioned>,
    messages: HashMap<NegotiationId, Vec<NegotiationMessage>>,
}

impl NegotiationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created negotiation at version 1.
    ///
    /// # Errors
    /// Returns [`AccordError::DuplicateNegotiation`] if the ID exists.
    pub fn insert(&mut self, negotiation: Negotiation) -> Result<()> {
        let id = negotiation.negotiation_id;
        if self.entries.contains_key(&id) {
            return Err(AccordError::DuplicateNegotiation(id));
        }
        self.entries.insert(
            id,
            Versioned {
                negotiation,
                version: 1,
            },
        );
        Ok(())
    }

    /// Snapshot a negotiation: a clone plus the version to commit against.
    ///
    /// # Errors
    /// Returns [`AccordError::NegotiationNotFound`] for unknown IDs.
    pub fn snapshot(&self, id: NegotiationId) -> Result<(Negotiation, u64)> {
        self.entries
            .get(&id)
            .map(|v| (v.negotiation.clone(), v.version))
            .ok_or(AccordError::NegotiationNotFound(id))
    }

    /// Commit a mutated snapshot. The stored version must still equal
    /// `expected_version`; otherwise another transition won the race and
    /// nothing changes.
    ///
    /// # Errors
    /// - [`AccordError::NegotiationNotFound`] for unknown IDs.
    /// - [`AccordError::Concurrency`] on a version conflict (retriable).
    pub fn commit(
        &mut self,
        negotiation: Negotiation,
        expected_version: u64,
    ) -> Result<()> {
        let id = negotiation.negotiation_id;
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(AccordError::NegotiationNotFound(id))?;
        if entry.version != expected_version {
            return Err(AccordError::Concurrency {
                reason: format!("negotiation {id} moved from version {expected_version}"),
            });
        }
        entry.negotiation = negotiation;
        entry.version += 1;
        Ok(())
    }

    /// Append a protocol message to the negotiation's log.
    pub fn log_message(&mut self, message: NegotiationMessage) {
        self.messages
            .entry(message.negotiation_id)
            .or_default()
            .push(message);
    }

    /// The append-only message log for a negotiation.
    #[must_use]
    pub fn messages(&self, id: &NegotiationId) -> &[NegotiationMessage] {
        self.messages.get(id).map_or(&[], Vec::as_slice)
    }

    /// IDs of negotiations whose deadline has passed and whose state the
    /// scheduler may expire.
    #[must_use]
    pub fn expirable(&self, now: DateTime<Utc>) -> Vec<NegotiationId> {
        let mut out: Vec<NegotiationId> = self
            .entries
            .values()
            .filter(|v| v.negotiation.status.is_expirable() && v.negotiation.deadline_passed(now))
            .map(|v| v.negotiation.negotiation_id)
            .collect();
        out.sort();
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
