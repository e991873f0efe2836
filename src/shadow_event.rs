//! In-memory DAG node wrapping an [`Event`] with mutable link fields.
//!
//! The teacher's `dag.rs` links events implicitly through petgraph edges
//! (`index_map: DashMap<EventHash, NodeIndex>` plus a `StableDiGraph`).
//! Spec §3 asks for something a bit different: explicit, independently
//! nullable `selfParent`/`otherParent`/`selfChildren`/`otherChildren`
//! fields, because expiry must be able to null a surviving child's parent
//! pointer without touching the parent (already gone) or the whole graph.
//! We keep the teacher's hash-indexed-DashMap idea (see `shadow_graph.rs`)
//! but store links as [`EventHash`] references guarded by per-node
//! `RwLock`s rather than graph edges, matching the "index-by-hash plus
//! weak/back references" strategy spec §9 recommends for GC-backed
//! languages.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use crate::event::{Event, EventHash};

/// A node in the shadow graph. Exclusively owned by the [`crate::shadow_graph::ShadowGraph`]
/// that contains it; equality and hashing follow the wrapped event's base hash (spec §3).
#[derive(Debug)]
pub struct ShadowEvent {
    event: Event,
    self_parent: RwLock<Option<EventHash>>,
    other_parent: RwLock<Option<EventHash>>,
    self_children: RwLock<HashSet<EventHash>>,
    other_children: RwLock<HashSet<EventHash>>,
}

impl ShadowEvent {
    pub(crate) fn new(event: Event) -> Self {
        let self_parent = event.self_parent;
        let other_parent = event.other_parent;
        Self {
            event,
            self_parent: RwLock::new(self_parent),
            other_parent: RwLock::new(other_parent),
            self_children: RwLock::new(HashSet::new()),
            other_children: RwLock::new(HashSet::new()),
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn hash(&self) -> EventHash {
        self.event.base_hash
    }

    pub fn generation(&self) -> i64 {
        self.event.generation
    }

    pub fn self_parent(&self) -> Option<EventHash> {
        *self.self_parent.read().expect("shadow event lock poisoned")
    }

    pub fn other_parent(&self) -> Option<EventHash> {
        *self
            .other_parent
            .read()
            .expect("shadow event lock poisoned")
    }

    pub fn self_children(&self) -> HashSet<EventHash> {
        self.self_children
            .read()
            .expect("shadow event lock poisoned")
            .clone()
    }

    pub fn other_children(&self) -> HashSet<EventHash> {
        self.other_children
            .read()
            .expect("shadow event lock poisoned")
            .clone()
    }

    pub fn has_self_children(&self) -> bool {
        !self
            .self_children
            .read()
            .expect("shadow event lock poisoned")
            .is_empty()
    }

    pub(crate) fn add_self_child(&self, child: EventHash) {
        self.self_children
            .write()
            .expect("shadow event lock poisoned")
            .insert(child);
    }

    pub(crate) fn add_other_child(&self, child: EventHash) {
        self.other_children
            .write()
            .expect("shadow event lock poisoned")
            .insert(child);
    }

    /// Nulls the parent link pointing at an event that has just been
    /// expired (spec §3 Lifecycle / invariant I6).
    pub(crate) fn disconnect_parent(&self, parent: EventHash) {
        let mut sp = self
            .self_parent
            .write()
            .expect("shadow event lock poisoned");
        if *sp == Some(parent) {
            *sp = None;
        }
        drop(sp);
        let mut op = self
            .other_parent
            .write()
            .expect("shadow event lock poisoned");
        if *op == Some(parent) {
            *op = None;
        }
    }

    /// Severs every link this node holds, used by `ShadowGraph::clear`.
    pub(crate) fn disconnect_all(&self) {
        *self
            .self_parent
            .write()
            .expect("shadow event lock poisoned") = None;
        *self
            .other_parent
            .write()
            .expect("shadow event lock poisoned") = None;
        self.self_children
            .write()
            .expect("shadow event lock poisoned")
            .clear();
        self.other_children
            .write()
            .expect("shadow event lock poisoned")
            .clear();
    }
}

impl PartialEq for ShadowEvent {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}
impl Eq for ShadowEvent {}

impl Hash for ShadowEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash().hash(state);
    }
}
