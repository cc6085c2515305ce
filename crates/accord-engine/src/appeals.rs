//! The appeal subsystem: due process for disputed bindings.
//!
//! Appeals are created exclusively by the dispute transition, paired 1:1
//! with a CONFLICT trust event. From there: a resolver is assigned
//! (PENDING → REVIEWING), an optional review board is attached, and the
//! appeal is resolved with a bounded trust response — or escalated when
//! the SLA is breached.

use std::collections::HashMap;

use accord_ledger::{ReceiptLedger, TrustLedger};
use accord_types::{
    AccordError, Appeal, AppealId, AppealOutcome, AppealStatus, PrincipalId, ReceiptAction, Result,
    TrustEventId, constants,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

/// Owns every appeal from submission through its terminal state.
#[derive(Default)]
pub struct AppealDesk {
    appeals: HashMap<AppealId, Appeal>,
}

impl AppealDesk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a PENDING appeal for a CONFLICT trust event. Called only from
    /// the dispute transition.
    pub fn open(
        &mut self,
        trust_event_id: TrustEventId,
        appellant_id: PrincipalId,
        subject_id: PrincipalId,
        appeal_reason: String,
        evidence: Value,
        submitted_at: DateTime<Utc>,
    ) -> Appeal {
        let appeal = Appeal::open(
            trust_event_id,
            appellant_id,
            subject_id,
            appeal_reason,
            evidence,
            submitted_at,
        );
        self.appeals.insert(appeal.appeal_id, appeal.clone());
        tracing::info!(
            appeal = %appeal.appeal_id,
            appellant = %appellant_id,
            review_deadline = %appeal.review_deadline,
            "appeal opened"
        );
        appeal
    }

    /// Look up an appeal.
    ///
    /// # Errors
    /// Returns [`AccordError::AppealNotFound`] for unknown IDs.
    pub fn get(&self, appeal_id: &AppealId) -> Result<&Appeal> {
        self.appeals
            .get(appeal_id)
            .ok_or(AccordError::AppealNotFound(*appeal_id))
    }

    /// Assign a resolver from `candidates`, excluding the appellant and
    /// the conflict's subject. Selection is deterministic: the lowest
    /// eligible principal ID wins. Transitions PENDING → REVIEWING.
    ///
    /// # Errors
    /// - [`AccordError::InvalidAppealState`] outside PENDING.
    /// - [`AccordError::NoEligibleResolver`] when exclusions empty the pool.
    pub fn assign_resolver(
        &mut self,
        receipts: &mut ReceiptLedger,
        appeal_id: AppealId,
        candidates: &[PrincipalId],
    ) -> Result<Appeal> {
        let appeal = self.get(&appeal_id)?.clone();
        if appeal.status != AppealStatus::Pending {
            return Err(AccordError::InvalidAppealState {
                operation: "assign_resolver",
                status: appeal.status,
            });
        }
        let mut eligible: Vec<PrincipalId> = candidates
            .iter()
            .copied()
            .filter(|c| *c != appeal.appellant_id && *c != appeal.subject_id)
            .collect();
        eligible.sort();
        eligible.dedup();
        let Some(resolver) = eligible.first().copied() else {
            return Err(AccordError::NoEligibleResolver(appeal_id));
        };

        let mut metadata = Map::new();
        metadata.insert("appeal_id".into(), json!(appeal_id.canonical()));
        metadata.insert("resolver_id".into(), json!(resolver.canonical()));
        receipts.append(resolver, ReceiptAction::AppealAssigned, metadata)?;

        let stored = self
            .appeals
            .get_mut(&appeal_id)
            .ok_or(AccordError::AppealNotFound(appeal_id))?;
        stored.resolver_id = Some(resolver);
        stored.status = AppealStatus::Reviewing;
        Ok(stored.clone())
    }

    /// Attach a review board of 3–7 members, none of whom may be the
    /// appellant, the subject, or the resolver.
    ///
    /// # Errors
    /// - [`AccordError::InvalidAppealState`] once the appeal is terminal.
    /// - [`AccordError::ReviewBoardSize`] outside [3, 7].
    /// - [`AccordError::ReviewerConflict`] for an excluded member.
    pub fn add_review_board(
        &mut self,
        receipts: &mut ReceiptLedger,
        appeal_id: AppealId,
        members: Vec<PrincipalId>,
    ) -> Result<Appeal> {
        let appeal = self.get(&appeal_id)?.clone();
        if appeal.status.is_terminal() {
            return Err(AccordError::InvalidAppealState {
                operation: "add_review_board",
                status: appeal.status,
            });
        }
        let mut board = members;
        board.sort();
        board.dedup();
        if board.len() < constants::REVIEW_BOARD_MIN || board.len() > constants::REVIEW_BOARD_MAX {
            return Err(AccordError::ReviewBoardSize { size: board.len() });
        }
        for member in &board {
            if *member == appeal.appellant_id
                || *member == appeal.subject_id
                || Some(*member) == appeal.resolver_id
            {
                return Err(AccordError::ReviewerConflict { principal: *member });
            }
        }

        let recorder = appeal.resolver_id.unwrap_or(appeal.appellant_id);
        let mut metadata = Map::new();
        metadata.insert("appeal_id".into(), json!(appeal_id.canonical()));
        metadata.insert(
            "board".into(),
            json!(board.iter().map(PrincipalId::canonical).collect::<Vec<_>>()),
        );
        receipts.append(recorder, ReceiptAction::AppealBoardSet, metadata)?;

        let stored = self
            .appeals
            .get_mut(&appeal_id)
            .ok_or(AccordError::AppealNotFound(appeal_id))?;
        stored.review_board_ids = board;
        Ok(stored.clone())
    }

    /// Resolve a REVIEWING appeal. Applies the outcome's bounded trust
    /// delta through a resolution event on the appellant's trust chain.
    ///
    /// # Errors
    /// - [`AccordError::InvalidAppealState`] outside REVIEWING.
    /// - Trust bound / rate-limit errors from the ledger.
    pub fn resolve(
        &mut self,
        receipts: &mut ReceiptLedger,
        trust: &mut TrustLedger,
        appeal_id: AppealId,
        outcome: AppealOutcome,
        summary: &str,
    ) -> Result<Appeal> {
        let appeal = self.get(&appeal_id)?.clone();
        if appeal.status != AppealStatus::Reviewing {
            return Err(AccordError::InvalidAppealState {
                operation: "resolve",
                status: appeal.status,
            });
        }

        let resolution_event = trust.resolve(
            appeal.appellant_id,
            appeal.trust_event_id,
            outcome.trust_delta(),
            appeal_id,
        )?;

        let recorder = appeal.resolver_id.unwrap_or(appeal.appellant_id);
        let mut metadata = Map::new();
        metadata.insert("appeal_id".into(), json!(appeal_id.canonical()));
        metadata.insert("outcome".into(), json!(outcome.to_string()));
        metadata.insert(
            "resolution_event_id".into(),
            json!(resolution_event.event_id.canonical()),
        );
        receipts.append(recorder, ReceiptAction::AppealResolved, metadata)?;

        let now = Utc::now();
        let stored = self
            .appeals
            .get_mut(&appeal_id)
            .ok_or(AccordError::AppealNotFound(appeal_id))?;
        stored.status = AppealStatus::Resolved;
        stored.resolved_at = Some(now);
        stored.resolution = Some(format!("{outcome}: {summary}"));
        tracing::info!(appeal = %appeal_id, outcome = %outcome, "appeal resolved");
        Ok(stored.clone())
    }

    /// Withdraw a PENDING appeal. Only the appellant may, and only before
    /// review starts.
    ///
    /// # Errors
    /// - [`AccordError::PermissionDenied`] for anyone but the appellant.
    /// - [`AccordError::InvalidAppealState`] once REVIEWING or later.
    pub fn withdraw(
        &mut self,
        receipts: &mut ReceiptLedger,
        appeal_id: AppealId,
        principal: PrincipalId,
    ) -> Result<Appeal> {
        let appeal = self.get(&appeal_id)?.clone();
        if principal != appeal.appellant_id {
            return Err(AccordError::PermissionDenied {
                principal,
                reason: "only the appellant may withdraw an appeal".into(),
            });
        }
        if appeal.status != AppealStatus::Pending {
            return Err(AccordError::InvalidAppealState {
                operation: "withdraw",
                status: appeal.status,
            });
        }

        let mut metadata = Map::new();
        metadata.insert("appeal_id".into(), json!(appeal_id.canonical()));
        receipts.append(principal, ReceiptAction::AppealWithdrawn, metadata)?;

        let stored = self
            .appeals
            .get_mut(&appeal_id)
            .ok_or(AccordError::AppealNotFound(appeal_id))?;
        stored.status = AppealStatus::Withdrawn;
        Ok(stored.clone())
    }

    /// Escalate an appeal whose SLA is breached at `now`. A no-op
    /// (`Ok(None)`) when the SLA still holds or the appeal is terminal,
    /// so the scheduler can call this idempotently.
    ///
    /// # Errors
    /// Propagates receipt-append failures.
    pub fn escalate(
        &mut self,
        receipts: &mut ReceiptLedger,
        appeal_id: AppealId,
        now: DateTime<Utc>,
    ) -> Result<Option<Appeal>> {
        let appeal = self.get(&appeal_id)?.clone();
        if appeal.status.is_terminal() || !appeal.sla_breached(now) {
            return Ok(None);
        }

        let mut metadata = Map::new();
        metadata.insert("appeal_id".into(), json!(appeal_id.canonical()));
        metadata.insert("prior_status".into(), json!(appeal.status.to_string()));
        receipts.append(appeal.appellant_id, ReceiptAction::AppealEscalated, metadata)?;

        let stored = self
            .appeals
            .get_mut(&appeal_id)
            .ok_or(AccordError::AppealNotFound(appeal_id))?;
        stored.status = AppealStatus::Escalated;
        tracing::warn!(appeal = %appeal_id, "appeal SLA breached; escalated");
        Ok(Some(stored.clone()))
    }

    /// Appeals whose SLA is breached at `now`, in ID order.
    #[must_use]
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<AppealId> {
        let mut out: Vec<AppealId> = self
            .appeals
            .values()
            .filter(|a| a.sla_breached(now))
            .map(|a| a.appeal_id)
            .collect();
        out.sort();
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.appeals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.appeals.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
