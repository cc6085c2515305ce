//! # accord-ledger
//!
//! **Tamper-evidence plane**: the append-only receipt ledger and the
//! trust-event ledger, both hash-chained per principal.
//!
//! ## Architecture
//!
//! 1. **ReceiptLedger**: per-principal receipt chains with
//!    compare-and-swap head advancement and periodic Merkle checkpoints
//! 2. **TrustLedger**: per-actor trust-event chains with bounded deltas
//!    and a per-relationship monthly rate limit
//! 3. **merkle**: the binary SHA-256 tree (duplicate-last-leaf padding)
//!    behind checkpoint anchors
//!
//! Nothing in either ledger is ever updated or deleted; a bad append is
//! never "fixed", it simply never commits.

pub mod merkle;
pub mod receipt_ledger;
pub mod trust_ledger;

pub use merkle::{MerkleStep, merkle_path, merkle_root, verify_path};
pub use receipt_ledger::ReceiptLedger;
pub use trust_ledger::TrustLedger;
