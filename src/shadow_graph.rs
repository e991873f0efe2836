//! The shadow graph: the replicated, in-memory DAG of hashgraph events
//! (spec §4.1).
//!
//! Storage follows the teacher's `SpacetimeDAG` (`dag.rs`) in spirit — a
//! `DashMap<EventHash, _>` hash index for O(1) lookup/dedup, a running
//! `tips`/`heads` frontier maintained incrementally on insert — generalized
//! with the generation-indexed expiry and reservation machinery spec §4.1
//! and §4.2 require, which the teacher's append-only CRDT DAG has no
//! counterpart for.
//!
//! Concurrency (spec §5): every mutating operation and every read that must
//! observe a consistent set of links takes the single `meta` mutex. The
//! hash index (`DashMap`) is itself internally synchronized and is never
//! mutated except while holding `meta`, which is what lets
//! [`ShadowGraph::find_ancestors`] walk it — and the per-node link
//! `RwLock`s inside each [`ShadowEvent`] — without acquiring `meta` at all.
//! Reservations are what keep that walk's window from being mutated out
//! from under it mid-traversal.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::error::{GraphInitError, InsertError};
use crate::event::{Event, EventHash};
use crate::reservation::GenerationReservation;
use crate::shadow_event::ShadowEvent;

struct ReservationEntry {
    generation: i64,
    refcount: Arc<AtomicUsize>,
}

struct GraphMeta {
    generation_index: BTreeMap<i64, HashSet<EventHash>>,
    tips: HashSet<EventHash>,
    expire_below: i64,
    oldest_generation: i64,
    reservations: Vec<ReservationEntry>,
}

impl GraphMeta {
    fn empty() -> Self {
        Self {
            generation_index: BTreeMap::new(),
            tips: HashSet::new(),
            expire_below: 0,
            oldest_generation: 0,
            reservations: Vec::new(),
        }
    }
}

pub struct ShadowGraph {
    hash_index: DashMap<EventHash, Arc<ShadowEvent>>,
    meta: Mutex<GraphMeta>,
}

impl Default for ShadowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowGraph {
    pub fn new() -> Self {
        Self {
            hash_index: DashMap::new(),
            meta: Mutex::new(GraphMeta::empty()),
        }
    }

    /// Bootstraps the graph from a generation-ascending sequence (spec §4.1).
    pub fn init_from(&self, events: Vec<Event>, min_generation: i64) -> Result<(), GraphInitError> {
        if events.is_empty() {
            return Err(GraphInitError::EmptyEventList);
        }

        let first_generation = events[0].generation;
        {
            let mut meta = self.meta.lock().expect("shadow graph lock poisoned");
            meta.oldest_generation = first_generation;
            meta.expire_below = first_generation;
        }

        for event in events {
            let hash = event.base_hash;
            if let Err(err) = self.add(event) {
                tracing::warn!(event = ?hash, error = %err, "bootstrap insertion failed; continuing");
            }
        }

        let mut meta = self.meta.lock().expect("shadow graph lock poisoned");
        let mut generation = min_generation;
        while generation < first_generation {
            meta.generation_index.entry(generation).or_default();
            generation += 1;
        }

        Ok(())
    }

    /// Inserts an event, returning `Ok(true)` iff it was added.
    pub fn add(&self, event: Event) -> Result<bool, InsertError> {
        let mut meta = self.meta.lock().expect("shadow graph lock poisoned");

        if self.hash_index.contains_key(&event.base_hash) {
            return Err(InsertError::DuplicateShadow);
        }
        if event.generation < meta.oldest_generation {
            return Err(InsertError::Expired);
        }

        for parent in [event.self_parent, event.other_parent]
            .into_iter()
            .flatten()
        {
            if !self.hash_index.contains_key(&parent) {
                tracing::debug!(
                    event = ?event.base_hash,
                    parent = ?parent,
                    "parent not present in graph (dropped by expiry or not yet received); proceeding"
                );
            }
        }

        let hash = event.base_hash;
        let generation = event.generation;
        let self_parent = event.self_parent;
        let other_parent = event.other_parent;

        let shadow = Arc::new(ShadowEvent::new(event));
        self.hash_index.insert(hash, shadow);

        meta.generation_index
            .entry(generation)
            .or_default()
            .insert(hash);

        if let Some(sp_hash) = self_parent {
            if let Some(sp) = self.hash_index.get(&sp_hash) {
                sp.add_self_child(hash);
            }
        }
        if let Some(op_hash) = other_parent {
            if let Some(op) = self.hash_index.get(&op_hash) {
                op.add_other_child(hash);
            }
        }

        meta.tips.insert(hash);
        if let Some(sp_hash) = self_parent {
            meta.tips.remove(&sp_hash);
        }

        tracing::trace!(event = ?hash, generation, "event added");
        Ok(true)
    }

    pub fn shadow(&self, hash: &EventHash) -> Option<Arc<ShadowEvent>> {
        self.hash_index.get(hash).map(|r| r.clone())
    }

    pub fn shadows(&self, hashes: &[EventHash]) -> Vec<Option<Arc<ShadowEvent>>> {
        hashes.iter().map(|h| self.shadow(h)).collect()
    }

    pub fn is_hash_in_graph(&self, hash: &EventHash) -> bool {
        self.hash_index.contains_key(hash)
    }

    /// A point-in-time snapshot of the concurrency frontier.
    pub fn get_tips(&self) -> Vec<Arc<ShadowEvent>> {
        let tip_hashes: Vec<EventHash> = {
            let meta = self.meta.lock().expect("shadow graph lock poisoned");
            meta.tips.iter().cloned().collect()
        };
        tip_hashes
            .into_iter()
            .filter_map(|h| self.shadow(&h))
            .collect()
    }

    /// DFS ancestor closure via self-parent and other-parent (spec §4.1,
    /// property P5). Runs without the graph lock: it only reads the hash
    /// index and each node's immutable-once-set link fields, relying on a
    /// live [`GenerationReservation`] held by the caller to keep this
    /// traversal's window from being expired out from under it.
    pub fn find_ancestors<F>(
        &self,
        sources: &[Arc<ShadowEvent>],
        predicate: F,
    ) -> Vec<Arc<ShadowEvent>>
    where
        F: Fn(&ShadowEvent) -> bool,
    {
        let mut visited: HashSet<EventHash> = HashSet::new();
        let mut stack: Vec<EventHash> = Vec::new();
        let mut result = Vec::new();

        for source in sources {
            if let Some(p) = source.self_parent() {
                stack.push(p);
            }
            if let Some(p) = source.other_parent() {
                stack.push(p);
            }
        }

        while let Some(hash) = stack.pop() {
            if visited.contains(&hash) {
                continue;
            }
            visited.insert(hash);

            // Missing from the index means expired (or never received) —
            // either way, a legitimate traversal terminator (spec §4.1).
            let Some(node) = self.hash_index.get(&hash).map(|r| r.clone()) else {
                continue;
            };

            if !predicate(&node) {
                continue;
            }

            result.push(node.clone());

            if let Some(p) = node.self_parent() {
                stack.push(p);
            }
            if let Some(p) = node.other_parent() {
                stack.push(p);
            }
        }

        result
    }

    /// Idempotent request to raise the expiry floor (spec §4.1).
    pub fn expire_below(&self, new_generation: i64) {
        let mut meta = self.meta.lock().expect("shadow graph lock poisoned");

        if new_generation < meta.expire_below {
            tracing::warn!(
                current = meta.expire_below,
                requested = new_generation,
                "ignoring decrease of expire_below floor"
            );
            return;
        }
        meta.expire_below = new_generation;

        let floor = meta.expire_below;
        meta.reservations
            .retain(|r| !(r.refcount.load(Ordering::SeqCst) == 0 && r.generation < floor));

        let oldest_reserved = meta
            .reservations
            .first()
            .map(|r| r.generation)
            .unwrap_or(i64::MAX);
        let removal_floor = floor.min(oldest_reserved);

        while meta.oldest_generation < removal_floor {
            let generation = meta.oldest_generation;
            if let Some(bucket) = meta.generation_index.remove(&generation) {
                for hash in &bucket {
                    if let Some((_, shadow)) = self.hash_index.remove(hash) {
                        meta.tips.remove(hash);
                        for child_hash in shadow
                            .self_children()
                            .into_iter()
                            .chain(shadow.other_children())
                        {
                            if let Some(child) = self.hash_index.get(&child_hash) {
                                child.disconnect_parent(*hash);
                            }
                        }
                    }
                }
            }
            meta.oldest_generation += 1;
        }

        tracing::debug!(
            expire_below = floor,
            oldest_generation = meta.oldest_generation,
            "expiry advanced"
        );
    }

    /// Atomically acquires a reservation at the current `expire_below`.
    pub fn reserve(&self) -> GenerationReservation {
        let mut meta = self.meta.lock().expect("shadow graph lock poisoned");
        let current = meta.expire_below;

        if let Some(last) = meta.reservations.last() {
            if last.generation == current {
                last.refcount.fetch_add(1, Ordering::SeqCst);
                return GenerationReservation::new(current, last.refcount.clone());
            }
        }

        let refcount = Arc::new(AtomicUsize::new(1));
        meta.reservations.push(ReservationEntry {
            generation: current,
            refcount: refcount.clone(),
        });
        GenerationReservation::new(current, refcount)
    }

    pub fn oldest_generation(&self) -> i64 {
        self.meta
            .lock()
            .expect("shadow graph lock poisoned")
            .oldest_generation
    }

    pub fn expire_below_floor(&self) -> i64 {
        self.meta
            .lock()
            .expect("shadow graph lock poisoned")
            .expire_below
    }

    pub fn len(&self) -> usize {
        self.hash_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash_index.is_empty()
    }

    /// Resets to empty state, disconnecting every node to aid garbage collection.
    pub fn clear(&self) {
        let mut meta = self.meta.lock().expect("shadow graph lock poisoned");
        for entry in self.hash_index.iter() {
            entry.value().disconnect_all();
        }
        self.hash_index.clear();
        meta.generation_index.clear();
        meta.tips.clear();
        meta.reservations.clear();
        meta.expire_below = 0;
        meta.oldest_generation = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_at(
        self_parent: Option<EventHash>,
        other_parent: Option<EventHash>,
        generation: i64,
    ) -> Event {
        Event::new(self_parent, other_parent, generation, 1, vec![])
    }

    #[test]
    fn single_event_is_a_tip() {
        let graph = ShadowGraph::new();
        let e = event_at(None, None, 0);
        let hash = e.base_hash;
        assert!(graph.add(e).unwrap());
        let tips = graph.get_tips();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].hash(), hash);
    }

    #[test]
    fn child_supersedes_self_parent_as_tip() {
        let graph = ShadowGraph::new();
        let genesis = event_at(None, None, 0);
        let genesis_hash = genesis.base_hash;
        graph.add(genesis).unwrap();

        let child = event_at(Some(genesis_hash), None, 1);
        let child_hash = child.base_hash;
        graph.add(child).unwrap();

        let tips: HashSet<EventHash> = graph.get_tips().into_iter().map(|t| t.hash()).collect();
        assert_eq!(tips, HashSet::from([child_hash]));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let graph = ShadowGraph::new();
        let e = event_at(None, None, 0);
        let clone = e.clone();
        graph.add(e).unwrap();
        assert_eq!(graph.add(clone), Err(InsertError::DuplicateShadow));
    }

    #[test]
    fn expired_insert_rejected() {
        let graph = ShadowGraph::new();
        let first = event_at(None, None, 5);
        graph.init_from(vec![first], 0).unwrap();

        let stale = event_at(None, None, 2);
        assert_eq!(graph.add(stale), Err(InsertError::Expired));
    }

    #[test]
    fn expire_below_removes_unreserved_generations_and_nulls_child_links() {
        let graph = ShadowGraph::new();
        let genesis = event_at(None, None, 0);
        let genesis_hash = genesis.base_hash;
        graph.add(genesis).unwrap();

        let child = event_at(Some(genesis_hash), None, 1);
        let child_hash = child.base_hash;
        graph.add(child).unwrap();

        graph.expire_below(1);
        assert!(!graph.is_hash_in_graph(&genesis_hash));
        let child_shadow = graph.shadow(&child_hash).unwrap();
        assert_eq!(child_shadow.self_parent(), None);
    }

    #[test]
    fn reservation_blocks_expiry_of_protected_generations() {
        let graph = ShadowGraph::new();
        let events: Vec<Event> = (0..21).map(|g| event_at(None, None, g)).collect();
        graph.init_from(events, 0).unwrap();

        let reservation = graph.reserve(); // at generation 0
        graph.expire_below(15);
        // Nothing removed: reservation sits at generation 0.
        assert_eq!(graph.len(), 21);

        reservation.close();
        graph.expire_below(15);
        assert_eq!(graph.len(), 21 - 15);
    }

    #[test]
    fn find_ancestors_excludes_sources_and_deduplicates() {
        let graph = ShadowGraph::new();
        let genesis = event_at(None, None, 0);
        let genesis_hash = genesis.base_hash;
        graph.add(genesis).unwrap();

        let a = event_at(Some(genesis_hash), None, 1);
        let a_hash = a.base_hash;
        graph.add(a).unwrap();

        let b = event_at(Some(a_hash), None, 2);
        graph.add(b).unwrap();

        let tip = graph.shadow(&graph.get_tips()[0].hash()).unwrap();
        let ancestors = graph.find_ancestors(std::slice::from_ref(&tip), |_| true);
        let hashes: HashSet<EventHash> = ancestors.iter().map(|s| s.hash()).collect();

        assert!(!hashes.contains(&tip.hash()));
        assert!(hashes.contains(&genesis_hash));
        assert!(hashes.contains(&a_hash));
        assert_eq!(hashes.len(), 2);
    }
}
