//! `FallenBehindManager` (spec §4.5): aggregates neighbor reports that we
//! appear to have fallen behind them.

use std::collections::HashSet;
use std::sync::Mutex;

use super::PeerId;

pub struct FallenBehindManager {
    threshold_fraction: f64,
    number_of_nodes: usize,
    reporters: Mutex<HashSet<PeerId>>,
}

impl FallenBehindManager {
    pub fn new(threshold_fraction: f64, number_of_nodes: usize) -> Self {
        Self {
            threshold_fraction,
            number_of_nodes,
            reporters: Mutex::new(HashSet::new()),
        }
    }

    /// Deduplicated per-peer accumulator.
    pub fn report_fallen_behind(&self, peer: PeerId) {
        let mut reporters = self
            .reporters
            .lock()
            .expect("fallen behind manager lock poisoned");
        if reporters.insert(peer) {
            tracing::info!(
                ?peer,
                count = reporters.len(),
                "peer reports we have fallen behind"
            );
        }
    }

    /// Clears accumulated reports after a successful reconnect.
    pub fn reset_fallen_behind(&self) {
        self.reporters
            .lock()
            .expect("fallen behind manager lock poisoned")
            .clear();
    }

    /// True once the number of unique reporters exceeds the configured
    /// super-minority threshold of the network.
    pub fn has_fallen_behind(&self) -> bool {
        let reporters = self
            .reporters
            .lock()
            .expect("fallen behind manager lock poisoned");
        let threshold = self.threshold_fraction * self.number_of_nodes as f64;
        reporters.len() as f64 > threshold
    }

    /// The peers most likely to have the required history: the reporters
    /// themselves, intersected with currently-connected neighbors.
    pub fn neighbors_for_reconnect(&self, connected: &[PeerId]) -> Vec<PeerId> {
        let reporters = self
            .reporters
            .lock()
            .expect("fallen behind manager lock poisoned");
        connected
            .iter()
            .filter(|p| reporters.contains(p))
            .copied()
            .collect()
    }
}
