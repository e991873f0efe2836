//! `shadowgraph-core`: the in-memory hashgraph event DAG (the "shadow
//! graph") and the three-phase peer reconciliation protocol that keeps
//! two replicas' graphs in agreement.
//!
//! This crate is deliberately narrow: consensus (round/witness/fame
//! decisions), event creation/signing, individual event wire encoding,
//! and everything CLI/GUI/storage-shaped lives outside it. What's here
//! is the gossip substrate those layers build on.

pub mod config;
pub mod error;
pub mod event;
pub mod generations;
pub mod reservation;
pub mod shadow_event;
pub mod shadow_graph;
pub mod sync;

pub use config::SynchronizerConfig;
pub use error::{GenerationsError, GraphInitError, InsertError, SyncError};
pub use event::{CreatorId, Event, EventHash, Payload};
pub use generations::{
    sync_fallen_behind_status, FallenBehindStatus, GraphGenerations, FIRST_GENERATION,
};
pub use reservation::GenerationReservation;
pub use shadow_event::ShadowEvent;
pub use shadow_graph::ShadowGraph;
pub use sync::{
    EventIntake, FallenBehindManager, PeerId, ShadowGraphSynchronizer, SimultaneousSyncThrottle,
    SyncLease, SyncOutcome,
};
