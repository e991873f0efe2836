//! Property tests for `GraphGenerations` construction and the fallen-behind
//! status rule (spec §8, properties P4, P8).

use proptest::prelude::*;
use shadowgraph_core::{sync_fallen_behind_status, FallenBehindStatus, GraphGenerations};

proptest! {
    /// P4: a monotone triple always constructs and round-trips through
    /// bincode unchanged; a non-monotone one is always rejected.
    #[test]
    fn construction_matches_monotonicity(a in 0i64..1000, b_delta in 0i64..1000, c_delta in 0i64..1000) {
        let b = a + b_delta;
        let c = b + c_delta;

        let g = GraphGenerations::new(a, b, c).expect("ascending triple constructs");
        let bytes = bincode::serialize(&g).unwrap();
        let decoded: GraphGenerations = bincode::deserialize(&bytes).unwrap();
        prop_assert_eq!(g, decoded);

        // Swapping the first two components out of order is rejected
        // unless they happened to already be equal.
        if a != b {
            prop_assert!(GraphGenerations::new(b, a, c).is_err());
        }
    }

    /// P8: `sync_fallen_behind_status` follows exactly the three-way rule
    /// from the generation triples' max/min bounds.
    #[test]
    fn fallen_behind_status_matches_bounds(
        our_min in 0i64..50, our_mid_delta in 0i64..50, our_max_delta in 0i64..50,
        their_min in 0i64..50, their_mid_delta in 0i64..50, their_max_delta in 0i64..50,
    ) {
        let ours = GraphGenerations::new(our_min, our_min + our_mid_delta, our_min + our_mid_delta + our_max_delta).unwrap();
        let theirs = GraphGenerations::new(their_min, their_min + their_mid_delta, their_min + their_mid_delta + their_max_delta).unwrap();

        let status = sync_fallen_behind_status(&ours, &theirs);
        let expected = if theirs.max_round_generation() < ours.min_round_generation() {
            FallenBehindStatus::OtherFallenBehind
        } else if ours.max_round_generation() < theirs.min_round_generation() {
            FallenBehindStatus::SelfFallenBehind
        } else {
            FallenBehindStatus::NoneFallenBehind
        };
        prop_assert_eq!(status, expected);
    }
}
