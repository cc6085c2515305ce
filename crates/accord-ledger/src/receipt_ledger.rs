//! The append-only receipt ledger: one hash chain per principal.
//!
//! Every committed transition lands here as a [`Receipt`] whose
//! `previous_hash` points at the principal's prior receipt. The head
//! pointer is advanced by compare-and-swap: an append that observed a
//! stale head fails with `AC_ERR_400` and the caller retries. Receipts
//! are never rewritten to "fix" a bad append.
//!
//! Every 30 minutes the checkpoint job calls [`ReceiptLedger::checkpoint`]
//! for each principal with activity since the last anchor, committing a
//! Merkle root over the window (§ [`crate::merkle`]) so historical
//! receipts verify in logarithmic work instead of a full chain walk.

use std::collections::HashMap;

use accord_crypto::{SystemSigner, receipt_content_hash, verify_chain};
use accord_types::{
    AccordError, GENESIS_HASH, PrincipalId, Receipt, ReceiptAction, ReceiptId, Result,
};
use chrono::Utc;
use serde_json::{Map, Value, json};

use crate::merkle::{merkle_path, merkle_root, verify_path};

/// Append-only, hash-chained receipt store with per-principal heads.
pub struct ReceiptLedger {
    /// Per-principal chains, genesis first.
    chains: HashMap<PrincipalId, Vec<Receipt>>,
    /// Index of the first receipt not yet covered by a checkpoint.
    checkpoint_cursor: HashMap<PrincipalId, usize>,
    /// Optional system key; absent means receipts stay unsigned.
    signer: Option<SystemSigner>,
}

impl ReceiptLedger {
    #[must_use]
    pub fn new(signer: Option<SystemSigner>) -> Self {
        Self {
            chains: HashMap::new(),
            checkpoint_cursor: HashMap::new(),
            signer,
        }
    }

    /// Current head hash for a principal (zero hash before any receipt).
    #[must_use]
    pub fn head(&self, principal: &PrincipalId) -> [u8; 32] {
        self.chains
            .get(principal)
            .and_then(|c| c.last())
            .map_or(GENESIS_HASH, |r| r.content_hash)
    }

    /// The principal's full chain, genesis first.
    #[must_use]
    pub fn chain(&self, principal: &PrincipalId) -> &[Receipt] {
        self.chains.get(principal).map_or(&[], Vec::as_slice)
    }

    /// Append a receipt to the principal's chain.
    ///
    /// # Errors
    /// - [`AccordError::Concurrency`] when another append raced this one
    ///   (stale head); the caller retries.
    /// - [`AccordError::Canonicalization`] when the metadata is not
    ///   canonicalizable — fatal, indicates a bug upstream.
    pub fn append(
        &mut self,
        principal: PrincipalId,
        action: ReceiptAction,
        metadata: Map<String, Value>,
    ) -> Result<Receipt> {
        let head = self.head(&principal);
        self.append_with_expected_head(principal, head, action, metadata)
    }

    /// Append with an explicit compare-and-swap on the head pointer.
    ///
    /// # Errors
    /// See [`ReceiptLedger::append`].
    pub fn append_with_expected_head(
        &mut self,
        principal: PrincipalId,
        expected_head: [u8; 32],
        action: ReceiptAction,
        metadata: Map<String, Value>,
    ) -> Result<Receipt> {
        let current = self.head(&principal);
        if current != expected_head {
            return Err(AccordError::Concurrency {
                reason: format!("receipt head moved for {principal}"),
            });
        }

        let mut receipt = Receipt {
            receipt_id: ReceiptId::new(),
            principal_id: principal,
            action,
            metadata,
            previous_hash: current,
            content_hash: [0u8; 32],
            system_signature: None,
            created_at: Utc::now(),
        };
        receipt.content_hash = receipt_content_hash(&receipt)?;
        if let Some(signer) = &self.signer {
            receipt.system_signature = Some(signer.sign(&receipt.content_hash));
        }

        self.chains.entry(principal).or_default().push(receipt.clone());
        tracing::debug!(
            principal = %principal,
            action = %action,
            content_hash = hex::encode(receipt.content_hash),
            "receipt appended"
        );
        Ok(receipt)
    }

    /// Replay the last `n` receipts of a principal's chain: internal
    /// hash-link consistency plus recomputed content hashes.
    #[must_use]
    pub fn verify_tail(&self, principal: &PrincipalId, n: usize) -> bool {
        let chain = self.chain(principal);
        let start = chain.len().saturating_sub(n);
        let expected_prev = if start == 0 {
            GENESIS_HASH
        } else {
            chain[start - 1].content_hash
        };
        let mut prev = expected_prev;
        for receipt in &chain[start..] {
            if receipt.previous_hash != prev {
                return false;
            }
            let Ok(recomputed) = receipt_content_hash(receipt) else {
                return false;
            };
            if recomputed != receipt.content_hash {
                return false;
            }
            prev = receipt.content_hash;
        }
        prev == self.head(principal)
    }

    /// Replay the whole chain from genesis against the current head.
    #[must_use]
    pub fn verify_full(&self, principal: &PrincipalId) -> bool {
        verify_chain(&self.head(principal), self.chain(principal))
    }

    /// Principals with receipts not yet covered by a checkpoint.
    #[must_use]
    pub fn principals_with_activity(&self) -> Vec<PrincipalId> {
        let mut out: Vec<PrincipalId> = self
            .chains
            .iter()
            .filter(|(p, chain)| {
                chain.len() > self.checkpoint_cursor.get(p).copied().unwrap_or(0)
            })
            .map(|(p, _)| *p)
            .collect();
        out.sort();
        out
    }

    /// Commit a checkpoint for one principal: a Merkle root over every
    /// receipt since the previous checkpoint. A window with no activity
    /// is a no-op and returns `Ok(None)`.
    ///
    /// The checkpoint receipt itself anchors the window; it is covered by
    /// the hash chain, not by its own window's root.
    ///
    /// # Errors
    /// Propagates append failures; the cursor only advances on success.
    pub fn checkpoint(&mut self, principal: PrincipalId) -> Result<Option<Receipt>> {
        let cursor = self.checkpoint_cursor.get(&principal).copied().unwrap_or(0);
        let chain = self.chain(&principal);
        let window_end = chain.len();
        if cursor >= window_end {
            return Ok(None);
        }

        let leaves: Vec<[u8; 32]> = chain[cursor..window_end]
            .iter()
            .map(|r| r.content_hash)
            .collect();
        let root = merkle_root(&leaves);

        let mut metadata = Map::new();
        metadata.insert("window_start".into(), json!(cursor));
        metadata.insert("window_end".into(), json!(window_end));
        metadata.insert("merkle_root".into(), json!(hex::encode(root)));
        metadata.insert("receipt_count".into(), json!(leaves.len()));

        let receipt = self.append(principal, ReceiptAction::Checkpoint, metadata)?;
        // Next window starts after the checkpoint receipt.
        self.checkpoint_cursor
            .insert(principal, self.chain(&principal).len());
        tracing::info!(
            principal = %principal,
            receipts = leaves.len(),
            merkle_root = hex::encode(root),
            "checkpoint committed"
        );
        Ok(Some(receipt))
    }

    /// Checkpoint every principal with activity. Returns the anchors
    /// committed this round.
    ///
    /// # Errors
    /// Fails on the first append error; earlier anchors remain committed.
    pub fn checkpoint_all(&mut self) -> Result<Vec<Receipt>> {
        let mut out = Vec::new();
        for principal in self.principals_with_activity() {
            if let Some(receipt) = self.checkpoint(principal)? {
                out.push(receipt);
            }
        }
        Ok(out)
    }

    /// Verify the receipts at chain indices `[start, end)` against their
    /// enclosing checkpoint's Merkle root, without walking the full chain.
    ///
    /// # Errors
    /// - [`AccordError::StorageIntegrity`] when no single checkpoint
    ///   window encloses the requested segment.
    pub fn verify_segment(
        &self,
        principal: &PrincipalId,
        start: usize,
        end: usize,
    ) -> Result<bool> {
        let chain = self.chain(principal);
        let anchor = chain
            .iter()
            .filter(|r| r.is_checkpoint())
            .find_map(|r| {
                let ws = usize::try_from(r.metadata.get("window_start")?.as_u64()?).ok()?;
                let we = usize::try_from(r.metadata.get("window_end")?.as_u64()?).ok()?;
                (ws <= start && end <= we).then_some((ws, we, r))
            });
        let Some((ws, we, anchor)) = anchor else {
            return Err(AccordError::StorageIntegrity {
                reason: format!("no checkpoint window encloses [{start}, {end}) for {principal}"),
            });
        };

        let expected_root = anchor
            .metadata
            .get("merkle_root")
            .and_then(Value::as_str)
            .and_then(|s| hex::decode(s).ok())
            .and_then(|b| <[u8; 32]>::try_from(b).ok())
            .ok_or_else(|| AccordError::StorageIntegrity {
                reason: "checkpoint receipt carries no merkle_root".into(),
            })?;

        let leaves: Vec<[u8; 32]> = chain[ws..we].iter().map(|r| r.content_hash).collect();
        if merkle_root(&leaves) != expected_root {
            return Ok(false);
        }
        for idx in start..end {
            let receipt = &chain[idx];
            let Ok(recomputed) = receipt_content_hash(receipt) else {
                return Ok(false);
            };
            if recomputed != receipt.content_hash {
                return Ok(false);
            }
            let Some(path) = merkle_path(&leaves, idx - ws) else {
                return Ok(false);
            };
            if !verify_path(&receipt.content_hash, &path, &expected_root) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
