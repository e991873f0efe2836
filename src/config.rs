//! Configuration consumed from outer layers (spec §6).
//!
//! A plain struct with a hand-written `Default`, in the shape of the
//! anti-entropy runtime config in the pack's `aura-anti-entropy` crate —
//! no config-loading or env/file parsing lives in the core (spec §1 rules
//! that out explicitly); outer layers own constructing one of these and
//! handing it to the synchronizer.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    /// Inbound-sync cap enforced by [`crate::sync::SimultaneousSyncThrottle`].
    pub max_listener_syncs: usize,
    /// Whether to emit the trailing bandwidth-throttle payload.
    pub throttle_enabled: bool,
    /// Upper bound, in bytes, on the throttle payload.
    pub throttle_max_bytes: u32,
    /// Factor multiplying bytes-sent to derive throttle payload size.
    pub throttle_extra: f64,
    /// Fraction of `number_of_nodes` below which the throttle activates.
    pub throttle_threshold: f64,
    /// Fraction of neighbors whose fallen-behind reports trigger `has_fallen_behind`.
    pub fallen_behind_threshold_fraction: f64,
    /// Size of the network, used to bound tip-list length and derive thresholds.
    pub number_of_nodes: usize,
    /// Wall-clock maximum for one sync attempt (spec §5 "Timeouts").
    /// Exceeding it surfaces [`crate::error::SyncError::Timeout`], equivalent
    /// to cancellation in effect. `None` disables the bound.
    pub sync_timeout: Option<Duration>,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            max_listener_syncs: 10,
            throttle_enabled: false,
            throttle_max_bytes: 4096,
            throttle_extra: 0.1,
            throttle_threshold: 0.5,
            fallen_behind_threshold_fraction: 0.34,
            number_of_nodes: 4,
            sync_timeout: Some(Duration::from_secs(30)),
        }
    }
}
