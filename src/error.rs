//! Error taxonomy for the shadow graph and its reconciliation protocol.
//!
//! Mirrors the teacher's `DagError` in spirit (a small `thiserror` enum
//! propagated with `?`, never a panic) but generalized to the full set of
//! outcomes the spec distinguishes between hard errors and plain result
//! values.

use thiserror::Error;

/// Outcome of attempting to insert an event into the graph.
///
/// These are not exceptional: a caller feeding a stream of events from the
/// network should expect duplicates and expired events routinely.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InsertError {
    #[error("event is null")]
    NullEvent,
    #[error("event already present in graph")]
    DuplicateShadow,
    #[error("event generation is below the expiry floor")]
    Expired,
}

/// Returned by [`crate::shadow_graph::ShadowGraph::init_from`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphInitError {
    #[error("bootstrap event sequence must not be empty")]
    EmptyEventList,
}

/// Returned by [`crate::generations::GraphGenerations::new`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationsError {
    #[error(
        "generations must satisfy minRoundGeneration <= minGenNonAncient <= maxRoundGeneration \
         (got {min_round_generation}, {min_gen_non_ancient}, {max_round_generation})"
    )]
    NotMonotone {
        min_round_generation: i64,
        min_gen_non_ancient: i64,
        max_round_generation: i64,
    },
    #[error("minRoundGeneration {0} is below the platform's first generation {1}")]
    BelowFirstGeneration(i64, i64),
}

/// Fatal-to-this-sync failures raised while running the three-phase protocol.
///
/// `FallenBehind` and peer/self rejection are deliberately *not* members of
/// this enum: spec §7 treats them as result values returned on the `Ok`
/// path (see [`crate::sync::synchronizer::SyncOutcome`]), not as errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("protocol violation in phase {phase}: {detail}")]
    Protocol { phase: &'static str, detail: String },
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("sync cancelled")]
    Cancelled,
    #[error("sync timed out after {0:?}")]
    Timeout(std::time::Duration),
}
