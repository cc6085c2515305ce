//! Principal key registry.
//!
//! Public keys are registered once and read-only thereafter. Enrolling in
//! a negotiation copies the key into the negotiation's own
//! `participant_keys` snapshot, which freezes it for that negotiation's
//! lifetime regardless of what happens to the registry afterwards.

use std::collections::HashMap;

use accord_types::{AccordError, Principal, PrincipalId, PublicKeyBytes, Result};

/// Registry of participant public keys. Private keys never enter the core.
#[derive(Default)]
pub struct KeyRing {
    keys: HashMap<PrincipalId, Principal>,
}

impl KeyRing {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a principal's public key. Re-registering the identical key
    /// is a no-op; a different key is rejected.
    ///
    /// # Errors
    /// Returns [`AccordError::KeyAlreadyRegistered`] on a conflicting key.
    pub fn register(&mut self, principal_id: PrincipalId, public_key: PublicKeyBytes) -> Result<()> {
        if let Some(existing) = self.keys.get(&principal_id) {
            if existing.public_key != public_key {
                return Err(AccordError::KeyAlreadyRegistered(principal_id));
            }
            return Ok(());
        }
        self.keys
            .insert(principal_id, Principal::new(principal_id, public_key));
        Ok(())
    }

    /// Look up a principal's registered key.
    ///
    /// # Errors
    /// Returns [`AccordError::KeyNotRegistered`] when absent.
    pub fn public_key(&self, principal_id: &PrincipalId) -> Result<PublicKeyBytes> {
        self.keys
            .get(principal_id)
            .map(|p| p.public_key)
            .ok_or(AccordError::KeyNotRegistered(*principal_id))
    }

    #[must_use]
    pub fn is_registered(&self, principal_id: &PrincipalId) -> bool {
        self.keys.contains_key(principal_id)
    }
}
