//! Warm-restart snapshot types

use crate::error::{EngineError, Result};
use crate::learning::Experience;
use crate::types::{GateCoefficients, GateId, GateKind, GateState};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted state of one gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub id: GateId,
    pub kind: GateKind,
    pub name: String,
    pub state: GateState,
    pub coefficients: GateCoefficients,
}

/// Everything needed to resume adaptation after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    /// When the snapshot was taken
    pub saved_at: chrono::DateTime<chrono::Utc>,
    /// Ticks processed before the snapshot
    pub tick: u64,
    pub gates: Vec<GateSnapshot>,
    /// Pipeline order at snapshot time
    pub order: Vec<GateId>,
    /// Experience memory, oldest first
    pub experiences: Vec<Experience>,
    pub memory_capacity: usize,
    pub adaptation_score: f64,
}

impl EngineSnapshot {
    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and version-check a snapshot
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: EngineSnapshot = serde_json::from_str(json)
            .map_err(|e| EngineError::Snapshot(format!("Failed to parse snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::Snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Save snapshot to a file (JSON format)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        tracing::info!("Saved snapshot to {:?}", path);
        Ok(())
    }

    /// Load snapshot from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalSummary;

    fn sample() -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now(),
            tick: 12,
            gates: vec![GateSnapshot {
                id: GateId(0),
                kind: GateKind::NoiseReduction,
                name: "noise_reduction".into(),
                state: GateState {
                    pressure: 0.5,
                    efficiency: 0.9,
                    ..Default::default()
                },
                coefficients: GateKind::NoiseReduction.default_coefficients(),
            }],
            order: vec![GateId(0)],
            experiences: vec![Experience::new(
                SignalSummary::default(),
                SignalSummary::default(),
                0.4,
            )],
            memory_capacity: 10,
            adaptation_score: 0.3,
        }
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        let snap = sample();
        snap.save(&path).unwrap();
        assert_eq!(EngineSnapshot::load(&path).unwrap(), snap);
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut snap = sample();
        snap.version = 99;
        let json = serde_json::to_string(&snap).unwrap();
        let err = EngineSnapshot::from_json(&json).unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(ref m) if m.contains("99")));
    }

    #[test]
    fn test_garbage_is_snapshot_error() {
        assert!(matches!(
            EngineSnapshot::from_json("{not json"),
            Err(EngineError::Snapshot(_))
        ));
    }
}
