//! System-key custody: the well-known key that countersigns receipts.
//!
//! The key is loaded from the `SYSTEM_SIGNING_KEY` environment variable as
//! a base64-encoded 32-byte Ed25519 seed. Absence is not an error — system
//! signatures are simply skipped and receipts remain valid without them.
//! The private key lives inside this type and never crosses the crate
//! boundary.

use accord_types::{AccordError, Result, constants};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use ed25519_dalek::{Signer, SigningKey};

/// Holds the system Ed25519 signing key.
pub struct SystemSigner {
    signing_key: SigningKey,
}

impl SystemSigner {
    /// Decode a signer from a base64-encoded 32-byte seed.
    ///
    /// # Errors
    /// Returns [`AccordError::InvalidSystemKey`] for bad base64 or a seed
    /// of the wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| AccordError::InvalidSystemKey {
                reason: format!("base64 decode failed: {e}"),
            })?;
        let seed: [u8; 32] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| AccordError::InvalidSystemKey {
                    reason: format!("expected 32-byte seed, got {} bytes", bytes.len()),
                })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Load the signer from `SYSTEM_SIGNING_KEY`. `Ok(None)` when the
    /// variable is unset: signing is skipped, not an error.
    ///
    /// # Errors
    /// Returns [`AccordError::InvalidSystemKey`] when the variable is set
    /// but malformed — a configured-but-broken key must not be silently
    /// ignored.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(constants::ENV_SYSTEM_SIGNING_KEY) {
            Ok(encoded) => {
                let signer = Self::from_base64(&encoded)?;
                tracing::info!("system signing key loaded; receipts will carry system signatures");
                Ok(Some(signer))
            }
            Err(_) => {
                tracing::info!("no system signing key configured; receipts stay unsigned");
                Ok(None)
            }
        }
    }

    /// Sign a content hash with the system key.
    #[must_use]
    pub fn sign(&self, content_hash: &[u8; 32]) -> Vec<u8> {
        self.signing_key.sign(content_hash).to_bytes().to_vec()
    }

    /// The system public key, for external verifiers.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for SystemSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("SystemSigner")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::{SIGNATURE_LEN, verify};

    #[test]
    fn from_base64_roundtrip() {
        let seed = [42u8; 32];
        let encoded = BASE64_STANDARD.encode(seed);
        let signer = SystemSigner::from_base64(&encoded).unwrap();

        let hash = [9u8; 32];
        let sig = signer.sign(&hash);
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(verify(&signer.public_key(), &hash, &sig));
    }

    #[test]
    fn bad_base64_rejected() {
        let err = SystemSigner::from_base64("not-base64!!!").unwrap_err();
        assert!(matches!(err, AccordError::InvalidSystemKey { .. }));
    }

    #[test]
    fn wrong_seed_length_rejected() {
        let encoded = BASE64_STANDARD.encode([1u8; 16]);
        let err = SystemSigner::from_base64(&encoded).unwrap_err();
        assert!(matches!(err, AccordError::InvalidSystemKey { .. }));
    }

    #[test]
    fn debug_hides_private_key() {
        let signer = SystemSigner::from_base64(&BASE64_STANDARD.encode([1u8; 32])).unwrap();
        let debug = format!("{signer:?}");
        assert!(debug.contains("public_key"));
        assert!(!debug.contains("signing_key"));
    }
}
