//! `GraphGenerations` — the immutable triple exchanged during phase 1 of
//! a sync (spec §3, §6).

use serde::{Deserialize, Serialize};

use crate::error::GenerationsError;

/// The platform's first generation. No replica may claim a
/// `minRoundGeneration` below this (spec §3).
pub const FIRST_GENERATION: i64 = 0;

/// Immutable `{minRoundGeneration, minGenNonAncient, maxRoundGeneration}`
/// triple read from consensus and sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphGenerations {
    min_round_generation: i64,
    min_gen_non_ancient: i64,
    max_round_generation: i64,
}

impl GraphGenerations {
    /// Constructs a new triple, rejecting violations of
    /// `minRoundGeneration <= minGenNonAncient <= maxRoundGeneration` or a
    /// `minRoundGeneration` below [`FIRST_GENERATION`].
    pub fn new(
        min_round_generation: i64,
        min_gen_non_ancient: i64,
        max_round_generation: i64,
    ) -> Result<Self, GenerationsError> {
        if min_round_generation < FIRST_GENERATION {
            return Err(GenerationsError::BelowFirstGeneration(
                min_round_generation,
                FIRST_GENERATION,
            ));
        }
        if !(min_round_generation <= min_gen_non_ancient
            && min_gen_non_ancient <= max_round_generation)
        {
            return Err(GenerationsError::NotMonotone {
                min_round_generation,
                min_gen_non_ancient,
                max_round_generation,
            });
        }
        Ok(Self {
            min_round_generation,
            min_gen_non_ancient,
            max_round_generation,
        })
    }

    pub fn min_round_generation(&self) -> i64 {
        self.min_round_generation
    }

    pub fn min_gen_non_ancient(&self) -> i64 {
        self.min_gen_non_ancient
    }

    pub fn max_round_generation(&self) -> i64 {
        self.max_round_generation
    }
}

/// Result of comparing two peers' [`GraphGenerations`] during phase 1
/// (spec §4.3, §8 property P8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallenBehindStatus {
    /// The peer's newest events are older than our oldest non-ancient generation.
    OtherFallenBehind,
    /// Our newest events are older than the peer's oldest non-ancient generation.
    SelfFallenBehind,
    NoneFallenBehind,
}

/// `SyncFallenBehindStatus(self, other)` from spec §4.3.
pub fn sync_fallen_behind_status(
    ours: &GraphGenerations,
    theirs: &GraphGenerations,
) -> FallenBehindStatus {
    if theirs.max_round_generation() < ours.min_round_generation() {
        FallenBehindStatus::OtherFallenBehind
    } else if ours.max_round_generation() < theirs.min_round_generation() {
        FallenBehindStatus::SelfFallenBehind
    } else {
        FallenBehindStatus::NoneFallenBehind
    }
}
