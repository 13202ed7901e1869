//! Section settings for the engine configuration
//!
//! Each section is a serde struct with `#[serde(default)]` so a config file
//! only needs to mention what it changes.
//!
//! # Main Types
//!
//! - [`QualityConfig`] - Spectral cutoff, artifact threshold and metric weights
//! - [`AdaptationConfig`] - Adaptation score and performance metric blending
//! - [`GateConfig`] - Per-gate variant, starting coefficients and controller tuning
//!
//! The blend weights have no derivation behind them; they are defaults that a
//! deployment is expected to tune. Weight groups must sum to 1.

use crate::types::{GateCoefficients, GateKind};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a weight group sums to 1
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Largest accepted `GateConfig::exploration`
const MAX_EXPLORATION: f64 = 0.5;

/// Weights of the four sub-metrics in `QualityMetrics::overall`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub snr: f64,
    pub artifact: f64,
    pub stability: f64,
    pub frequency: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            snr: 0.4,
            artifact: 0.2,
            stability: 0.2,
            frequency: 0.2,
        }
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.snr + self.artifact + self.stability + self.frequency
    }

    fn validate(&self) -> Result<(), String> {
        let all = [self.snr, self.artifact, self.stability, self.frequency];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("quality weights must be finite and non-negative".into());
        }
        if (self.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("quality weights sum to {}, expected 1", self.sum()));
        }
        Ok(())
    }
}

/// Signal quality assessment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Spectral power above this frequency counts as noise (Hz)
    pub snr_cutoff_hz: f64,
    /// Samples further than this many σ from the mean are artifacts
    pub artifact_sigma: f64,
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            snr_cutoff_hz: 100.0,
            artifact_sigma: 3.0,
            weights: QualityWeights::default(),
        }
    }
}

impl QualityConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.snr_cutoff_hz.is_finite() && self.snr_cutoff_hz > 0.0) {
            return Err("quality.snr_cutoff_hz must be positive".into());
        }
        if !(self.artifact_sigma.is_finite() && self.artifact_sigma > 0.0) {
            return Err("quality.artifact_sigma must be positive".into());
        }
        self.weights.validate()
    }
}

/// Adaptation score and performance metric settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Weight of the current pipeline efficiency in the adaptation score
    pub pipeline_weight: f64,
    /// Weight of the recent mean performance in the adaptation score
    pub history_weight: f64,
    /// Number of recent experiences averaged for the history term
    pub recent_window: usize,
    /// Performance metric: weight of output quality
    pub output_quality_weight: f64,
    /// Performance metric: weight of quality improvement over the input
    pub improvement_weight: f64,
    /// Performance metric: weight of pipeline efficiency
    pub efficiency_weight: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            pipeline_weight: 0.6,
            history_weight: 0.4,
            recent_window: 50,
            output_quality_weight: 0.5,
            improvement_weight: 0.3,
            efficiency_weight: 0.2,
        }
    }
}

impl AdaptationConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        let score = self.pipeline_weight + self.history_weight;
        if self.pipeline_weight < 0.0
            || self.history_weight < 0.0
            || (score - 1.0).abs() > WEIGHT_SUM_TOLERANCE
        {
            return Err(format!(
                "adaptation score weights must be non-negative and sum to 1 (got {})",
                score
            ));
        }
        let perf = self.output_quality_weight + self.improvement_weight + self.efficiency_weight;
        if self.output_quality_weight < 0.0
            || self.improvement_weight < 0.0
            || self.efficiency_weight < 0.0
            || (perf - 1.0).abs() > WEIGHT_SUM_TOLERANCE
        {
            return Err(format!(
                "performance weights must be non-negative and sum to 1 (got {})",
                perf
            ));
        }
        if self.recent_window == 0 {
            return Err("adaptation.recent_window must be at least 1".into());
        }
        Ok(())
    }
}

/// Configuration of a single gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub kind: GateKind,

    /// Display name; defaults to the variant name
    #[serde(default)]
    pub name: Option<String>,

    /// Starting coefficients; defaults to the variant defaults
    #[serde(default)]
    pub coefficients: Option<GateCoefficients>,

    /// Smoothing rate of the coefficient controller
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Number of past invocations the controller remembers
    #[serde(default = "default_controller_history")]
    pub controller_history: usize,

    /// Half-width of the trial offsets around the coefficients, as a
    /// fraction of each coefficient's range
    #[serde(default = "default_exploration")]
    pub exploration: f64,

    #[serde(default)]
    pub min_pressure: f64,

    #[serde(default = "default_max_pressure")]
    pub max_pressure: f64,

    /// Upper bound of `velocity` (invocations per second)
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_controller_history() -> usize {
    100
}

fn default_exploration() -> f64 {
    0.05
}

fn default_max_pressure() -> f64 {
    10.0
}

fn default_max_velocity() -> f64 {
    100_000.0
}

impl GateConfig {
    /// Create a gate config with defaults for the given variant
    pub fn new(kind: GateKind) -> Self {
        Self {
            kind,
            name: None,
            coefficients: None,
            learning_rate: default_learning_rate(),
            controller_history: default_controller_history(),
            exploration: default_exploration(),
            min_pressure: 0.0,
            max_pressure: default_max_pressure(),
            max_velocity: default_max_velocity(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set starting coefficients
    pub fn with_coefficients(mut self, coefficients: GateCoefficients) -> Self {
        self.coefficients = Some(coefficients);
        self
    }

    /// Set the controller smoothing rate
    pub fn with_learning_rate(mut self, alpha: f64) -> Self {
        self.learning_rate = alpha;
        self
    }

    /// Set the trial offset half-width (fraction of each coefficient range)
    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration;
        self
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.display_name().to_string())
    }

    /// Starting coefficients clamped into the variant bounds
    pub fn initial_coefficients(&self) -> GateCoefficients {
        let (min, max) = self.kind.coefficient_bounds();
        self.coefficients
            .unwrap_or_else(|| self.kind.default_coefficients())
            .clamp(&min, &max)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let name = self.display_name();
        if !(self.learning_rate.is_finite() && (0.0..=1.0).contains(&self.learning_rate)) {
            return Err(format!("gate '{}': learning_rate must be in [0, 1]", name));
        }
        if self.controller_history == 0 {
            return Err(format!("gate '{}': controller_history must be at least 1", name));
        }
        if !(self.exploration.is_finite() && (0.0..=MAX_EXPLORATION).contains(&self.exploration)) {
            return Err(format!(
                "gate '{}': exploration must be in [0, {}]",
                name, MAX_EXPLORATION
            ));
        }
        if !(self.min_pressure.is_finite()
            && self.max_pressure.is_finite()
            && self.min_pressure >= 0.0
            && self.min_pressure <= self.max_pressure)
        {
            return Err(format!(
                "gate '{}': pressure bounds must satisfy 0 <= min <= max",
                name
            ));
        }
        if !(self.max_velocity.is_finite() && self.max_velocity > 0.0) {
            return Err(format!("gate '{}': max_velocity must be positive", name));
        }
        if let Some(c) = &self.coefficients {
            if !c.is_finite() {
                return Err(format!("gate '{}': coefficients must be finite", name));
            }
        }
        Ok(())
    }
}

/// The canonical three-gate cascade: enhance, denoise, extract
pub fn default_gates() -> Vec<GateConfig> {
    GateKind::all().iter().map(|&k| GateConfig::new(k)).collect()
}
