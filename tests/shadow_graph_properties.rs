//! Property tests for the shadow graph's linkage, reservation, and
//! ancestor-search invariants (spec §8, properties P1-P3, P5).

use std::collections::HashSet;

use proptest::prelude::*;
use shadowgraph_core::{Event, ShadowGraph};

/// Builds a generation-ascending chain of `len` events, each the
/// self-parent of the next, so every `add`/`expire_below` sequence drawn
/// from the same chain shares a single linear lineage to check I2/I6
/// against.
fn build_chain(len: usize) -> Vec<Event> {
    let mut events = Vec::with_capacity(len);
    let mut parent = None;
    for generation in 0..len as i64 {
        let event = Event::new(parent, None, generation, 1, vec![]);
        parent = Some(event.base_hash);
        events.push(event);
    }
    events
}

proptest! {
    /// P1: after any finite sequence of `add`/`expire_below`, every
    /// surviving shadow event's reciprocal self-parent/self-child link
    /// holds.
    #[test]
    fn reciprocal_links_hold_after_add_and_expire(chain_len in 1usize..30, expire_to in 0i64..30) {
        let events = build_chain(chain_len);
        let graph = ShadowGraph::new();
        for event in events {
            graph.add(event).unwrap();
        }
        graph.expire_below(expire_to);

        for tip in graph.get_tips() {
            if let Some(parent_hash) = tip.self_parent() {
                let parent = graph.shadow(&parent_hash).expect("linked parent is present");
                prop_assert!(parent.self_children().contains(&tip.hash()));
            }
        }
    }

    /// P3: `expire_below` is monotone — repeated calls with smaller values
    /// never move the floor backwards.
    #[test]
    fn expire_below_is_monotone(chain_len in 1usize..20, calls in prop::collection::vec(0i64..25, 1..10)) {
        let events = build_chain(chain_len);
        let graph = ShadowGraph::new();
        for event in events {
            graph.add(event).unwrap();
        }

        let mut expected = graph.expire_below_floor();
        for call in calls {
            graph.expire_below(call);
            expected = expected.max(call);
            prop_assert_eq!(graph.expire_below_floor(), expected);
        }
    }

    /// P2: a live reservation at generation `g` keeps every event with
    /// generation `>= g` present no matter how high `expire_below` climbs.
    #[test]
    fn reservation_protects_its_generation_window(chain_len in 5usize..30, reserve_at in 0usize..25) {
        let reserve_at = reserve_at.min(chain_len.saturating_sub(1));
        let events = build_chain(chain_len);
        let graph = ShadowGraph::new();
        for event in &events {
            graph.add(event.clone()).unwrap();
        }

        // Advance to reserve_at, take a reservation there, then try to
        // expire everything.
        graph.expire_below(reserve_at as i64);
        let reservation = graph.reserve();
        let reserved_generation = reservation.generation();
        graph.expire_below(chain_len as i64);

        for event in &events {
            if event.generation >= reserved_generation {
                prop_assert!(graph.is_hash_in_graph(&event.base_hash));
            }
        }
    }

    /// P5: `find_ancestors` visits every reachable ancestor exactly once,
    /// never the sources themselves.
    #[test]
    fn find_ancestors_visits_each_reachable_node_exactly_once(chain_len in 2usize..40) {
        let events = build_chain(chain_len);
        let graph = ShadowGraph::new();
        for event in &events {
            graph.add(event.clone()).unwrap();
        }

        let tip = graph.get_tips().into_iter().next().unwrap();
        let ancestors = graph.find_ancestors(std::slice::from_ref(&tip), |_| true);
        let hashes: HashSet<_> = ancestors.iter().map(|a| a.hash()).collect();

        prop_assert_eq!(hashes.len(), ancestors.len());
        prop_assert!(!hashes.contains(&tip.hash()));
        prop_assert_eq!(hashes.len(), chain_len - 1);
    }
}
