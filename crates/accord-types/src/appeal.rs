//! Appeals: the SLA-bounded due-process layer attached to CONFLICT
//! trust events.
//!
//! ## State Machine
//!
//! ```text
//!   PENDING ──assign──▶ REVIEWING ──resolve──▶ RESOLVED
//!      │                    │
//!      │ withdraw           │ SLA breach
//!      ▼                    ▼
//!   WITHDRAWN           ESCALATED
//!      │ SLA breach
//!      ▼
//!   ESCALATED
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppealId, PrincipalId, TrustEventId, constants};

/// Lifecycle status of an appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppealStatus {
    /// Submitted; awaiting resolver assignment.
    Pending,
    /// A resolver is reviewing.
    Reviewing,
    /// Resolved with an outcome. Terminal.
    Resolved,
    /// Withdrawn by the appellant before review. Terminal.
    Withdrawn,
    /// SLA breached; handed to out-of-band escalation. Terminal.
    Escalated,
}

impl AppealStatus {
    /// Can this status transition to the given target status?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Reviewing | Self::Withdrawn | Self::Escalated)
                | (Self::Reviewing, Self::Resolved | Self::Escalated)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Withdrawn | Self::Escalated)
    }
}

impl fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Reviewing => write!(f, "REVIEWING"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Withdrawn => write!(f, "WITHDRAWN"),
            Self::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// Outcome of a resolved appeal, with its bounded trust response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppealOutcome {
    /// The appellant was vindicated; partial trust restoration.
    Upheld,
    /// The dispute was found baseless; further trust loss.
    Denied,
    /// No fault established either way; no trust change.
    Dismissed,
}

impl AppealOutcome {
    /// The trust delta applied on resolution. Magnitude stays within the
    /// per-event bound.
    #[must_use]
    pub fn trust_delta(&self) -> Decimal {
        match self {
            Self::Upheld => Decimal::new(1, 1),   // +0.1
            Self::Denied => Decimal::new(-1, 1),  // -0.1
            Self::Dismissed => Decimal::ZERO,
        }
    }
}

impl fmt::Display for AppealOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upheld => write!(f, "UPHELD"),
            Self::Denied => write!(f, "DENIED"),
            Self::Dismissed => write!(f, "DISMISSED"),
        }
    }
}

/// A dispute record attached to a CONFLICT trust event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appeal {
    pub appeal_id: AppealId,
    /// The CONFLICT trust event this appeal references.
    pub trust_event_id: TrustEventId,
    pub appellant_id: PrincipalId,
    /// The CONFLICT's subject; excluded from resolver and board selection.
    pub subject_id: PrincipalId,
    pub status: AppealStatus,
    pub appeal_reason: String,
    /// Snapshot evidence: `{negotiation_id, binding_hash, terms}`.
    pub evidence: Value,
    /// Assigned at PENDING → REVIEWING.
    pub resolver_id: Option<PrincipalId>,
    /// 3–7 members when set; excludes appellant, subject, and resolver.
    pub review_board_ids: Vec<PrincipalId>,
    pub submitted_at: DateTime<Utc>,
    /// `submitted_at` + 7 days.
    pub review_deadline: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl Appeal {
    /// Open a new PENDING appeal for a CONFLICT trust event.
    #[must_use]
    pub fn open(
        trust_event_id: TrustEventId,
        appellant_id: PrincipalId,
        subject_id: PrincipalId,
        appeal_reason: String,
        evidence: Value,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            appeal_id: AppealId::new(),
            trust_event_id,
            appellant_id,
            subject_id,
            status: AppealStatus::Pending,
            appeal_reason,
            evidence,
            resolver_id: None,
            review_board_ids: Vec::new(),
            submitted_at,
            review_deadline: submitted_at + Duration::days(constants::REVIEW_DEADLINE_DAYS),
            resolved_at: None,
            resolution: None,
        }
    }

    /// PENDING past the review deadline.
    #[must_use]
    pub fn is_pending_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AppealStatus::Pending && now > self.review_deadline
    }

    /// REVIEWING past 14 days from submission.
    #[must_use]
    pub fn is_review_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AppealStatus::Reviewing
            && now > self.submitted_at + Duration::days(constants::REVIEW_ESCALATION_DAYS)
    }

    /// Either SLA bound breached.
    #[must_use]
    pub fn sla_breached(&self, now: DateTime<Utc>) -> bool {
        self.is_pending_overdue(now) || self.is_review_overdue(now)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn make_appeal() -> Appeal {
        Appeal::open(
            TrustEventId::new(),
            PrincipalId::new(),
            PrincipalId::new(),
            "unmet terms".into(),
            json!({"negotiation_id": "00"}),
            Utc::now(),
        )
    }

    #[test]
    fn status_display() {
        assert_eq!(format!("{}", AppealStatus::Reviewing), "REVIEWING");
        assert_eq!(format!("{}", AppealStatus::Escalated), "ESCALATED");
    }

    #[test]
    fn review_deadline_is_seven_days_out() {
        let appeal = make_appeal();
        assert_eq!(
            appeal.review_deadline,
            appeal.submitted_at + Duration::days(7)
        );
        assert_eq!(appeal.status, AppealStatus::Pending);
    }

    #[test]
    fn transitions() {
        use AppealStatus::*;
        assert!(Pending.can_transition_to(Reviewing));
        assert!(Pending.can_transition_to(Withdrawn));
        assert!(Pending.can_transition_to(Escalated));
        assert!(Reviewing.can_transition_to(Resolved));
        assert!(Reviewing.can_transition_to(Escalated));
        assert!(!Reviewing.can_transition_to(Withdrawn));
        assert!(!Resolved.can_transition_to(Reviewing));
        assert!(!Escalated.can_transition_to(Pending));
    }

    #[test]
    fn sla_pending_overdue() {
        let mut appeal = make_appeal();
        appeal.submitted_at = Utc::now() - Duration::days(8);
        appeal.review_deadline = appeal.submitted_at + Duration::days(7);
        assert!(appeal.is_pending_overdue(Utc::now()));
        assert!(appeal.sla_breached(Utc::now()));
    }

    #[test]
    fn sla_reviewing_overdue_after_fourteen_days() {
        let mut appeal = make_appeal();
        appeal.status = AppealStatus::Reviewing;
        appeal.submitted_at = Utc::now() - Duration::days(13);
        assert!(!appeal.is_review_overdue(Utc::now()));
        appeal.submitted_at = Utc::now() - Duration::days(15);
        assert!(appeal.is_review_overdue(Utc::now()));
    }

    #[test]
    fn outcome_deltas_bounded() {
        for outcome in [
            AppealOutcome::Upheld,
            AppealOutcome::Denied,
            AppealOutcome::Dismissed,
        ] {
            assert!(outcome.trust_delta().abs() <= constants::max_trust_delta());
        }
    }
}
