//! The two periodic jobs: timeout enforcement and receipt checkpointing.
//!
//! Both are idempotent — expiring an already-expired negotiation and
//! checkpointing a window with no activity are no-ops — and both contain
//! their errors: one failing item is logged and skipped, never crashing
//! the run.

use accord_engine::NegotiationEngine;
use chrono::{DateTime, Utc};

/// What one timeout-job run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutReport {
    /// Negotiations moved to EXPIRED.
    pub expired: usize,
    /// Appeals moved to ESCALATED.
    pub escalated: usize,
}

/// Expire overdue negotiations and escalate SLA-breached appeals.
pub fn run_timeout_job(engine: &mut NegotiationEngine, now: DateTime<Utc>) -> TimeoutReport {
    let mut report = TimeoutReport::default();

    for negotiation_id in engine.expirable(now) {
        match engine.expire(negotiation_id, now) {
            Ok(Some(_)) => report.expired += 1,
            Ok(None) => {}
            Err(err) => {
                tracing::error!(negotiation = %negotiation_id, %err, "expire failed; skipping");
            }
        }
    }

    let overdue = engine.appeals().overdue(now);
    let (appeals, receipts, _trust) = engine.appeals_parts();
    for appeal_id in overdue {
        match appeals.escalate(receipts, appeal_id, now) {
            Ok(Some(_)) => report.escalated += 1,
            Ok(None) => {}
            Err(err) => {
                tracing::error!(appeal = %appeal_id, %err, "escalation failed; skipping");
            }
        }
    }

    if report.expired > 0 || report.escalated > 0 {
        tracing::info!(
            expired = report.expired,
            escalated = report.escalated,
            "timeout job complete"
        );
    }
    report
}

/// Checkpoint every principal with receipt activity since its last
/// anchor. Returns the number of anchors committed.
pub fn run_checkpoint_job(engine: &mut NegotiationEngine) -> usize {
    let ledger = engine.receipts_mut();
    let mut committed = 0;
    for principal in ledger.principals_with_activity() {
        match ledger.checkpoint(principal) {
            Ok(Some(_)) => committed += 1,
            Ok(None) => {}
            Err(err) => {
                tracing::error!(principal = %principal, %err, "checkpoint failed; skipping");
            }
        }
    }
    if committed > 0 {
        tracing::info!(anchors = committed, "checkpoint job complete");
    }
    committed
}

#[cfg(test)]
mod tests {
    use accord_crypto::TestKeypair;
    use accord_types::{CoreConfig, NegotiationId, NegotiationStatus, PrincipalId};
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn engine_with_negotiation() -> (NegotiationEngine, NegotiationId) {
        let mut engine = NegotiationEngine::new(CoreConfig::default()).unwrap();
        let a = PrincipalId::new();
        let b = PrincipalId::new();
        let keys_a = TestKeypair::generate();
        let keys_b = TestKeypair::generate();
        engine.register_principal(a, keys_a.public_key()).unwrap();
        engine.register_principal(b, keys_b.public_key()).unwrap();
        let n = engine
            .create(
                a,
                vec![a, b],
                json!({"x": 1}),
                None,
                Utc::now() + Duration::minutes(5),
            )
            .unwrap();
        (engine, n.negotiation_id)
    }

    #[test]
    fn timeout_job_expires_overdue() {
        let (mut engine, nid) = engine_with_negotiation();
        let later = Utc::now() + Duration::minutes(10);

        let report = run_timeout_job(&mut engine, later);
        assert_eq!(report.expired, 1);
        assert_eq!(
            engine.negotiation(nid).unwrap().status,
            NegotiationStatus::Expired
        );
    }

    #[test]
    fn timeout_job_is_idempotent() {
        let (mut engine, _nid) = engine_with_negotiation();
        let later = Utc::now() + Duration::minutes(10);

        assert_eq!(run_timeout_job(&mut engine, later).expired, 1);
        assert_eq!(run_timeout_job(&mut engine, later).expired, 0);
    }

    #[test]
    fn timeout_job_leaves_live_negotiations_alone() {
        let (mut engine, nid) = engine_with_negotiation();
        let report = run_timeout_job(&mut engine, Utc::now());
        assert_eq!(report, TimeoutReport::default());
        assert_eq!(
            engine.negotiation(nid).unwrap().status,
            NegotiationStatus::Initiated
        );
    }

    #[test]
    fn checkpoint_job_anchors_active_principals() {
        let (mut engine, _nid) = engine_with_negotiation();
        // Creation wrote one receipt on the creator's chain.
        assert_eq!(run_checkpoint_job(&mut engine), 1);
        // No new activity: second run is a no-op.
        assert_eq!(run_checkpoint_job(&mut engine), 0);
    }
}
