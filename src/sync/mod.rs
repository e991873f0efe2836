//! The three-phase peer reconciliation protocol (spec §4.3-§4.5, §6).

pub mod fallen_behind;
pub mod synchronizer;
pub mod throttle;
pub mod wire;

pub use fallen_behind::FallenBehindManager;
pub use synchronizer::{EventIntake, ShadowGraphSynchronizer, SyncOutcome};
pub use throttle::{SimultaneousSyncThrottle, SyncLease};

/// Identifies a gossip neighbor. The core treats this as opaque.
pub type PeerId = uuid::Uuid;
