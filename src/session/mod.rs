//! Warm-restart persistence
//!
//! An [`EngineSnapshot`] captures each gate's state and coefficients, the
//! pipeline order and the experience memory as a versioned JSON document.
//! Snapshots are written on demand; nothing on the tick path touches disk.

pub mod snapshot;

pub use snapshot::{EngineSnapshot, GateSnapshot, SNAPSHOT_VERSION};
