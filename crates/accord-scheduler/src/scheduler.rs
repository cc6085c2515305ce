//! Scheduler lifecycle: two periodic tokio tasks with explicit
//! start/stop.
//!
//! The scheduler is one instance per process and optional — without it,
//! deadlines are still enforced lazily on next access. Each tick
//! acquires the job's lease first; losing the race to another instance
//! skips the tick. Job errors are logged and never crash the tasks.

use std::sync::Arc;

use accord_engine::NegotiationEngine;
use accord_types::{SchedulerConfig, constants};
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::jobs::{run_checkpoint_job, run_timeout_job};
use crate::lease::Lease;

/// Handle to the running scheduler tasks.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start the timeout and checkpoint tasks.
    #[must_use]
    pub fn start(
        engine: Arc<Mutex<NegotiationEngine>>,
        lease: Arc<dyn Lease>,
        config: &SchedulerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let lease_ttl = config.lease_ttl;

        let timeout_handle = {
            let engine = Arc::clone(&engine);
            let lease = Arc::clone(&lease);
            let mut shutdown_rx = shutdown.subscribe();
            let interval = config.timeout_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let Some(guard) =
                                lease.try_acquire(constants::TIMEOUT_LEASE_NAME, lease_ttl)
                            else {
                                tracing::debug!("timeout lease held elsewhere; skipping tick");
                                continue;
                            };
                            let mut engine = engine.lock().await;
                            run_timeout_job(&mut engine, Utc::now());
                            drop(engine);
                            drop(guard);
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
            })
        };

        let checkpoint_handle = {
            let engine = Arc::clone(&engine);
            let lease = Arc::clone(&lease);
            let mut shutdown_rx = shutdown.subscribe();
            let interval = config.checkpoint_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let Some(guard) =
                                lease.try_acquire(constants::CHECKPOINT_LEASE_NAME, lease_ttl)
                            else {
                                tracing::debug!("checkpoint lease held elsewhere; skipping tick");
                                continue;
                            };
                            let mut engine = engine.lock().await;
                            run_checkpoint_job(&mut engine);
                            drop(engine);
                            drop(guard);
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
            })
        };

        tracing::info!(
            timeout_interval = ?config.timeout_interval,
            checkpoint_interval = ?config.checkpoint_interval,
            "scheduler started"
        );
        Self {
            shutdown,
            handles: vec![timeout_handle, checkpoint_handle],
        }
    }

    /// Stop both tasks and wait for them to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use accord_crypto::TestKeypair;
    use accord_types::{CoreConfig, NegotiationStatus, PrincipalId};
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    use super::*;
    use crate::lease::InProcessLease;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            timeout_interval: Duration::from_millis(10),
            checkpoint_interval: Duration::from_millis(10),
            lease_ttl: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn scheduler_expires_overdue_negotiations() {
        let mut engine = NegotiationEngine::new(CoreConfig::default()).unwrap();
        let a = PrincipalId::new();
        let b = PrincipalId::new();
        engine
            .register_principal(a, TestKeypair::generate().public_key())
            .unwrap();
        engine
            .register_principal(b, TestKeypair::generate().public_key())
            .unwrap();
        let n = engine
            .create(
                a,
                vec![a, b],
                json!({"x": 1}),
                None,
                Utc::now() + ChronoDuration::milliseconds(20),
            )
            .unwrap();
        let nid = n.negotiation_id;

        let engine = Arc::new(Mutex::new(engine));
        let scheduler = Scheduler::start(
            Arc::clone(&engine),
            Arc::new(InProcessLease::new()),
            &fast_config(),
        );

        // Give the deadline and a few ticks time to pass.
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown().await;

        let engine = engine.lock().await;
        assert_eq!(
            engine.negotiation(nid).unwrap().status,
            NegotiationStatus::Expired
        );
    }

    #[tokio::test]
    async fn shutdown_stops_cleanly() {
        let engine = Arc::new(Mutex::new(
            NegotiationEngine::new(CoreConfig::default()).unwrap(),
        ));
        let scheduler = Scheduler::start(
            Arc::clone(&engine),
            Arc::new(InProcessLease::new()),
            &fast_config(),
        );
        scheduler.shutdown().await;
        // Engine remains usable after shutdown.
        assert!(engine.lock().await.expirable(Utc::now()).is_empty());
    }
}
