//! # accord-crypto
//!
//! **Crypto service** for the Accord trust primitive: Ed25519 signature
//! verification over canonical message forms, SHA-256 hashing, custody of
//! the optional system signing key, and end-to-end hash-chain
//! verification.
//!
//! Design constraints:
//! - Verification never raises for untrusted input; every failure mode is
//!   `false`.
//! - Participant private keys never enter this crate; only the system
//!   signing key does, behind [`SystemSigner`]'s custody boundary.
//! - Algorithms are fixed (Ed25519 / SHA-256); there is no runtime
//!   algorithm selection.

pub mod chain;
pub mod ed25519;
pub mod hashing;
pub mod system;

pub use chain::{receipt_content_hash, trust_event_content_hash, verify_chain, verify_trust_chain};
pub use ed25519::verify;
pub use hashing::{hash_canonical, sha256};
pub use system::SystemSigner;

#[cfg(any(test, feature = "test-helpers"))]
pub use ed25519::TestKeypair;
