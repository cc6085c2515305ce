//! Ed25519 verification over canonical message forms.
//!
//! Verification never raises for untrusted input: malformed keys, wrong
//! lengths, and algorithmic failures all return `false`. Lengths are
//! rejected before the primitive is touched.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Verify an Ed25519 signature over `message` bytes.
///
/// Returns `false` for any failure: wrong key or signature length, a key
/// that is not a valid curve point, or a signature that does not verify.
#[must_use]
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <&[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = <&[u8; SIGNATURE_LEN]>::try_from(signature) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(key_bytes) else {
        return false;
    };
    let sig = Signature::from_bytes(sig_bytes);
    verifying_key.verify(message, &sig).is_ok()
}

/// Test keypair wrapping `ed25519_dalek::SigningKey`. **Never use in
/// production** — real participant keys never enter the core.
#[cfg(any(test, feature = "test-helpers"))]
pub struct TestKeypair {
    signing_key: ed25519_dalek::SigningKey,
}

#[cfg(any(test, feature = "test-helpers"))]
impl TestKeypair {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    #[must_use]
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer;
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}
