//! Configuration module for the Venturi engine
//!
//! This module handles engine configuration including:
//! - Sampling rate, channel layout and window length
//! - Latency budget and backpressure threshold
//! - Gate cascade, experience memory capacity and reorder cadence
//!
//! # Files
//!
//! Configuration is read from TOML (`.toml`) or JSON (`.json`), chosen by file
//! extension. Every section is optional; missing fields take their defaults.
//!
//! Warm-restart snapshots default to the platform data directory under
//! `dev.venturi.engine`:
//! - **Linux**: `~/.local/share/dev.venturi.engine/`
//! - **macOS**: `~/Library/Application Support/dev.venturi.engine/`
//! - **Windows**: `%APPDATA%\dev.venturi.engine\`
//!
//! # Example
//!
//! ```ignore
//! use venturi_rs::config::EngineConfig;
//!
//! let config = EngineConfig::load("engine.toml")?;
//! assert!(config.worker_count() >= 1);
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.venturi.engine";

/// Snapshot filename inside the data directory
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Default sampling rate in Hz
pub const DEFAULT_SAMPLING_RATE: f64 = 250.0;

/// Default per-tick latency budget in milliseconds
pub const DEFAULT_LATENCY_BUDGET_MS: f64 = 50.0;

/// Default experience memory capacity
pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

/// Upper bound on the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 8;

// ==================== Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default location of the warm-restart snapshot
pub fn default_snapshot_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(SNAPSHOT_FILE))
}

// ==================== Processing Mode ====================

/// How the gate cascade is applied to each window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Gates in pipeline order, each consuming the previous output
    #[default]
    Serial,
    /// Every gate on the same input, efficiency-weighted combination
    Parallel,
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Serial => write!(f, "serial"),
            ProcessingMode::Parallel => write!(f, "parallel"),
        }
    }
}

// ==================== Engine Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sampling rate of every channel (Hz)
    pub sampling_rate: f64,

    /// Number of input channels
    pub channels: usize,

    /// Channel names; missing names become `ch{index}`
    pub channel_names: Vec<String>,

    /// Samples per processing window
    pub window_len: usize,

    /// Capacity of each per-channel circular buffer
    pub buffer_capacity: usize,

    /// Per-tick latency budget (milliseconds)
    pub latency_budget_ms: f64,

    /// Consecutive overruns that raise `BackpressureExceeded`
    pub max_consecutive_overruns: u32,

    /// Experience memory capacity K
    pub memory_capacity: usize,

    /// Reorder the pipeline every this many ticks
    pub reorder_interval: u64,

    /// Per-gate efficiency history length H
    pub efficiency_history: usize,

    /// Worker pool size; defaults to `min(8, channels)`
    pub worker_threads: Option<usize>,

    pub mode: ProcessingMode,

    pub gates: Vec<GateConfig>,

    pub quality: QualityConfig,

    pub adaptation: AdaptationConfig,

    /// Where `SignalEngine::save_snapshot` writes by default
    pub snapshot_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampling_rate: DEFAULT_SAMPLING_RATE,
            channels: 1,
            channel_names: Vec::new(),
            window_len: 250,
            buffer_capacity: 1024,
            latency_budget_ms: DEFAULT_LATENCY_BUDGET_MS,
            max_consecutive_overruns: 3,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            reorder_interval: 25,
            efficiency_history: 100,
            worker_threads: None,
            mode: ProcessingMode::Serial,
            gates: default_gates(),
            quality: QualityConfig::default(),
            adaptation: AdaptationConfig::default(),
            snapshot_path: None,
        }
    }
}

impl EngineConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration for `channels` channels
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    /// Load a configuration file (TOML or JSON by extension) and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: EngineConfig = match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                EngineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?,
            _ => toml::from_str(&content).map_err(|e| {
                EngineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?,
        };

        config.validate()?;
        tracing::debug!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to disk (TOML or JSON by extension)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EngineError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = match extension(path).as_deref() {
            Some("json") => serde_json::to_string_pretty(self)
                .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?,
            _ => toml::to_string_pretty(self)
                .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?,
        };

        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check every invariant the engine relies on
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EngineError::Config(msg));

        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return fail("sampling_rate must be positive".into());
        }
        if self.channels == 0 {
            return fail("channels must be at least 1".into());
        }
        if self.channel_names.len() > self.channels {
            return fail(format!(
                "{} channel names given for {} channels",
                self.channel_names.len(),
                self.channels
            ));
        }
        if self.window_len == 0 {
            return fail("window_len must be at least 1".into());
        }
        if self.buffer_capacity < self.window_len {
            return fail(format!(
                "buffer_capacity ({}) must be >= window_len ({})",
                self.buffer_capacity, self.window_len
            ));
        }
        if !(self.latency_budget_ms.is_finite() && self.latency_budget_ms > 0.0) {
            return fail("latency_budget_ms must be positive".into());
        }
        if self.max_consecutive_overruns == 0 {
            return fail("max_consecutive_overruns must be at least 1".into());
        }
        if self.memory_capacity == 0 {
            return fail("memory_capacity must be at least 1".into());
        }
        if self.reorder_interval == 0 {
            return fail("reorder_interval must be at least 1".into());
        }
        if self.efficiency_history == 0 {
            return fail("efficiency_history must be at least 1".into());
        }
        if self.worker_threads == Some(0) {
            return fail("worker_threads must be at least 1".into());
        }
        if self.gates.is_empty() {
            return fail("at least one gate is required".into());
        }
        for gate in &self.gates {
            gate.validate().map_err(EngineError::Config)?;
        }
        self.quality.validate().map_err(EngineError::Config)?;
        self.adaptation.validate().map_err(EngineError::Config)?;
        Ok(())
    }

    /// Latency budget as a `Duration`
    pub fn latency_budget(&self) -> Duration {
        Duration::from_secs_f64(self.latency_budget_ms / 1000.0)
    }

    /// Effective worker pool size
    pub fn worker_count(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| self.channels.min(MAX_DEFAULT_WORKERS))
            .max(1)
    }

    /// Name of channel `index`
    pub fn channel_name(&self, index: usize) -> String {
        self.channel_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("ch{}", index))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GateKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gates.len(), 3);
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn test_worker_count_caps_at_eight() {
        assert_eq!(EngineConfig::with_channels(4).worker_count(), 4);
        assert_eq!(EngineConfig::with_channels(32).worker_count(), 8);
        let config = EngineConfig {
            worker_threads: Some(2),
            ..EngineConfig::with_channels(32)
        };
        assert_eq!(config.worker_count(), 2);
    }

    #[test]
    fn test_channel_names_fallback() {
        let config = EngineConfig {
            channels: 3,
            channel_names: vec!["Fz".into()],
            ..Default::default()
        };
        assert_eq!(config.channel_name(0), "Fz");
        assert_eq!(config.channel_name(2), "ch2");
    }

    #[test]
    fn test_validation_rejects_small_buffer() {
        let config = EngineConfig {
            window_len: 512,
            buffer_capacity: 256,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buffer_capacity"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_src = r#"
            sampling_rate = 500.0
            channels = 2
            mode = "parallel"

            [[gates]]
            kind = "noise_reduction"
            learning_rate = 0.05

            [quality]
            snr_cutoff_hz = 80.0
        "#;
        let config: EngineConfig = toml::from_str(toml_src).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling_rate, 500.0);
        assert_eq!(config.mode, ProcessingMode::Parallel);
        assert_eq!(config.gates.len(), 1);
        assert_eq!(config.gates[0].kind, GateKind::NoiseReduction);
        assert_eq!(config.gates[0].controller_history, 100);
        assert_eq!(config.quality.artifact_sigma, 3.0);
        assert_eq!(config.memory_capacity, DEFAULT_MEMORY_CAPACITY);
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            channels: 4,
            latency_budget_ms: 8.0,
            ..Default::default()
        };

        for name in ["engine.toml", "engine.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            let loaded = EngineConfig::load(&path).unwrap();
            assert_eq!(loaded, config);
        }
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
