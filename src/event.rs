//! The event type the shadow graph stores.
//!
//! Per spec §3, events themselves are opaque to the core: creation,
//! signing, and generation assignment belong to consensus and are outside
//! this crate. What the core needs is a concrete, content-addressed,
//! immutable record it can index, link, and ship over the wire — this is
//! that record, built the way the teacher's `Event` in `event.rs` builds
//! one (a `blake3` content hash over a random id, parent links, and a
//! payload), generalized to carry a generation and creator id instead of
//! a spacetime coordinate.

use std::collections::BTreeSet;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content-addressed identity of an [`Event`]. A 32-byte BLAKE3 digest.
pub type EventHash = [u8; 32];

/// Small non-negative integer identifying the event's creator (a node id).
pub type CreatorId = u32;

/// Opaque application payload. The core never interprets this; it only
/// needs something to hash and to carry across the wire.
pub type Payload = Vec<u8>;

/// Immutable, content-addressed hashgraph event.
///
/// `self_parent` and `other_parent` carry the causal links a
/// [`crate::shadow_event::ShadowEvent`] wires into the graph; `generation`
/// is assigned monotonically by consensus to every event such that a
/// child's generation is strictly greater than either parent's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Random per-event identifier, folded into the content hash so that
    /// two events with identical parents/generation/payload don't collide.
    pub id: Uuid,
    pub self_parent: Option<EventHash>,
    pub other_parent: Option<EventHash>,
    pub generation: i64,
    pub creator_id: CreatorId,
    pub payload: Payload,
    /// Content address of this event. Skipped on the wire and recomputed
    /// by the receiver from the rest of the fields.
    #[serde(skip)]
    pub base_hash: EventHash,
}

impl Event {
    pub fn new(
        self_parent: Option<EventHash>,
        other_parent: Option<EventHash>,
        generation: i64,
        creator_id: CreatorId,
        payload: Payload,
    ) -> Self {
        let id = Uuid::new_v4();
        let base_hash = Self::compute_hash(
            &id,
            self_parent,
            other_parent,
            generation,
            creator_id,
            &payload,
        );
        Self {
            id,
            self_parent,
            other_parent,
            generation,
            creator_id,
            payload,
            base_hash,
        }
    }

    fn compute_hash(
        id: &Uuid,
        self_parent: Option<EventHash>,
        other_parent: Option<EventHash>,
        generation: i64,
        creator_id: CreatorId,
        payload: &Payload,
    ) -> EventHash {
        let mut hasher = Hasher::new();
        hasher.update(id.as_bytes());
        if let Some(p) = self_parent {
            hasher.update(&p);
        }
        if let Some(p) = other_parent {
            hasher.update(&p);
        }
        hasher.update(&generation.to_le_bytes());
        hasher.update(&creator_id.to_le_bytes());
        hasher.update(payload);
        *hasher.finalize().as_bytes()
    }

    /// Parent hashes as a set, for callers building send-sets or seeding
    /// ancestor searches.
    pub fn parents(&self) -> BTreeSet<EventHash> {
        self.self_parent
            .into_iter()
            .chain(self.other_parent)
            .collect()
    }

    /// Canonical bytes that feed the content hash. This is the "hashed
    /// data" half of the phase-3 wire record (spec §4.3/§6); the core does
    /// not define what goes in the "unhashed data" half (signatures, in a
    /// full platform) since individual event serialization is out of
    /// scope — we ship an empty placeholder for it.
    pub fn hashed_data(&self) -> Vec<u8> {
        bincode::serialize(self).expect("Event serialization is infallible")
    }

    pub fn unhashed_data(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Reconstructs an `Event` from its wire halves, recomputing the
    /// content hash the way a receiver would.
    pub fn from_wire(hashed_data: &[u8], _unhashed_data: &[u8]) -> bincode::Result<Self> {
        let mut event: Self = bincode::deserialize(hashed_data)?;
        event.base_hash = Self::compute_hash(
            &event.id,
            event.self_parent,
            event.other_parent,
            event.generation,
            event.creator_id,
            &event.payload,
        );
        Ok(event)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.base_hash == other.base_hash
    }
}
impl Eq for Event {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_recomputes_hash() {
        let event = Event::new(None, None, 0, 1, vec![1, 2, 3]);
        let hashed = event.hashed_data();
        let unhashed = event.unhashed_data();
        let decoded = Event::from_wire(&hashed, &unhashed).expect("decodes");
        assert_eq!(decoded.base_hash, event.base_hash);
    }

    #[test]
    fn distinct_events_hash_differently() {
        let a = Event::new(None, None, 0, 1, vec![1]);
        let b = Event::new(None, None, 0, 1, vec![2]);
        assert_ne!(a.base_hash, b.base_hash);
    }
}
