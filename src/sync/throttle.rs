//! `SimultaneousSyncThrottle` (spec §4.4).
//!
//! Per-peer locking follows the same non-blocking-try-then-scoped-guard
//! shape as [`crate::reservation::GenerationReservation`]: a lease that
//! releases on drop, so a cancelled or erroring sync can never leak a peer
//! lock. Per-peer locks are `tokio::sync::Mutex` (matching the teacher's
//! choice of async mutexes over its shared `SpacetimeDAG`) held through an
//! owned guard so the lease can outlive the call that created it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::PeerId;

pub struct SimultaneousSyncThrottle {
    max_listener_syncs: usize,
    num_listener_syncs: Arc<AtomicUsize>,
    num_syncs: Arc<AtomicUsize>,
    per_peer_locks: DashMap<PeerId, Arc<Mutex<()>>>,
}

impl SimultaneousSyncThrottle {
    pub fn new(max_listener_syncs: usize) -> Self {
        Self {
            max_listener_syncs,
            num_listener_syncs: Arc::new(AtomicUsize::new(0)),
            num_syncs: Arc::new(AtomicUsize::new(0)),
            per_peer_locks: DashMap::new(),
        }
    }

    pub fn num_syncs(&self) -> usize {
        self.num_syncs.load(Ordering::SeqCst)
    }

    pub fn num_listener_syncs(&self) -> usize {
        self.num_listener_syncs.load(Ordering::SeqCst)
    }

    fn lock_for(&self, peer: PeerId) -> Arc<Mutex<()>> {
        self.per_peer_locks
            .entry(peer)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Attempts to acquire a sync lease with `peer`. Never blocks.
    pub fn try_sync(&self, peer: PeerId, is_outbound: bool) -> Option<SyncLease> {
        if !is_outbound && self.num_listener_syncs.load(Ordering::SeqCst) > self.max_listener_syncs
        {
            tracing::debug!(?peer, "rejecting inbound sync: listener cap exceeded");
            return None;
        }

        let lock = self.lock_for(peer);
        let guard = lock.try_lock_owned().ok()?;

        self.num_syncs.fetch_add(1, Ordering::SeqCst);
        if !is_outbound {
            self.num_listener_syncs.fetch_add(1, Ordering::SeqCst);
        }

        Some(SyncLease {
            _guard: guard,
            is_outbound,
            num_syncs: self.num_syncs.clone(),
            num_listener_syncs: self.num_listener_syncs.clone(),
        })
    }

    /// Serially blocking-acquires and immediately releases every peer's
    /// lock. Used at shutdown to drain in-flight syncs.
    pub async fn wait_for_all_syncs_to_finish(&self) {
        let locks: Vec<Arc<Mutex<()>>> = self
            .per_peer_locks
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for lock in locks {
            let _guard = lock.lock().await;
        }
    }
}

/// A held sync lease. Decrements the throttle's counters on drop.
pub struct SyncLease {
    _guard: OwnedMutexGuard<()>,
    is_outbound: bool,
    num_syncs: Arc<AtomicUsize>,
    num_listener_syncs: Arc<AtomicUsize>,
}

impl Drop for SyncLease {
    fn drop(&mut self) {
        self.num_syncs.fetch_sub(1, Ordering::SeqCst);
        if !self.is_outbound {
            self.num_listener_syncs.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn listener_cap_rejects_excess_inbound_syncs() {
        let throttle = SimultaneousSyncThrottle::new(1);
        let a = throttle.try_sync(Uuid::new_v4(), false).unwrap();
        let b = throttle.try_sync(Uuid::new_v4(), false).unwrap();
        assert!(throttle.try_sync(Uuid::new_v4(), false).is_none());
        drop(a);
        drop(b);
    }

    #[test]
    fn same_peer_cannot_hold_two_concurrent_leases() {
        let throttle = SimultaneousSyncThrottle::new(10);
        let peer = Uuid::new_v4();
        let lease = throttle.try_sync(peer, true).unwrap();
        assert!(throttle.try_sync(peer, true).is_none());
        drop(lease);
        assert!(throttle.try_sync(peer, true).is_some());
    }

    #[tokio::test]
    async fn concurrent_try_sync_on_same_peer_yields_exactly_one_lease() {
        let throttle = Arc::new(SimultaneousSyncThrottle::new(10));
        let peer = Uuid::new_v4();

        let t1 = {
            let throttle = throttle.clone();
            tokio::spawn(async move { throttle.try_sync(peer, true) })
        };
        let t2 = {
            let throttle = throttle.clone();
            tokio::spawn(async move { throttle.try_sync(peer, true) })
        };

        let (r1, r2) = (t1.await.unwrap(), t2.await.unwrap());
        assert_eq!(r1.is_some() as u8 + r2.is_some() as u8, 1);
    }
}
