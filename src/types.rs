//! Core data types shared across the engine
//!
//! Everything that crosses a component boundary lives here: quality metrics,
//! gate identity/state, experience summaries and the per-tick result. All of
//! these are plain tagged structs; there are no open maps on the hot path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense index of a gate in declaration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateId(pub u32);

impl GateId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GateId({})", self.0)
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fixed variant of a gate, chosen at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// DC removal, adaptive gain and soft limiting
    SignalEnhancement,
    /// Artifact clipping followed by an adaptive low-pass
    NoiseReduction,
    /// Spectral peak retention blended with the input
    PatternExtraction,
}

impl GateKind {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            GateKind::SignalEnhancement => "signal_enhancement",
            GateKind::NoiseReduction => "noise_reduction",
            GateKind::PatternExtraction => "pattern_extraction",
        }
    }

    /// Get all gate kinds in canonical order
    pub fn all() -> &'static [GateKind] {
        &[
            GateKind::SignalEnhancement,
            GateKind::NoiseReduction,
            GateKind::PatternExtraction,
        ]
    }

    /// Starting coefficients for this variant
    pub fn default_coefficients(&self) -> GateCoefficients {
        match self {
            GateKind::SignalEnhancement => GateCoefficients {
                gain: 1.0,
                smoothing: 0.0,
                threshold: 4.0,
                mix: 1.0,
            },
            GateKind::NoiseReduction => GateCoefficients {
                gain: 1.0,
                smoothing: 0.5,
                threshold: 3.0,
                mix: 1.0,
            },
            GateKind::PatternExtraction => GateCoefficients {
                gain: 1.0,
                smoothing: 0.0,
                threshold: 0.2,
                mix: 0.7,
            },
        }
    }

    /// Inclusive (min, max) bounds for every coefficient of this variant
    pub fn coefficient_bounds(&self) -> (GateCoefficients, GateCoefficients) {
        match self {
            GateKind::SignalEnhancement | GateKind::NoiseReduction => (
                GateCoefficients {
                    gain: 0.25,
                    smoothing: 0.0,
                    threshold: 1.5,
                    mix: 0.0,
                },
                GateCoefficients {
                    gain: 4.0,
                    smoothing: 0.95,
                    threshold: 8.0,
                    mix: 1.0,
                },
            ),
            GateKind::PatternExtraction => (
                GateCoefficients {
                    gain: 0.25,
                    smoothing: 0.0,
                    threshold: 0.01,
                    mix: 0.0,
                },
                GateCoefficients {
                    gain: 4.0,
                    smoothing: 0.95,
                    threshold: 0.9,
                    mix: 1.0,
                },
            ),
        }
    }

    /// 1.0 for every coefficient the variant's kernel reads, 0.0 otherwise
    pub fn tuned_mask(&self) -> GateCoefficients {
        let (smoothing, mix) = match self {
            GateKind::SignalEnhancement => (0.0, 0.0),
            GateKind::NoiseReduction => (1.0, 0.0),
            GateKind::PatternExtraction => (0.0, 1.0),
        };
        GateCoefficients {
            gain: 1.0,
            smoothing,
            threshold: 1.0,
            mix,
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Multi-metric quality score of one window. All fields are in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub snr: f64,
    pub artifact_ratio: f64,
    pub stability: f64,
    pub frequency_quality: f64,
    pub overall: f64,
}

impl QualityMetrics {
    /// Metrics reported for degenerate windows and degraded ticks
    pub const fn zero() -> Self {
        Self {
            snr: 0.0,
            artifact_ratio: 0.0,
            stability: 0.0,
            frequency_quality: 0.0,
            overall: 0.0,
        }
    }

    /// Field-wise mean over several channels
    pub fn mean_of(metrics: &[QualityMetrics]) -> Self {
        if metrics.is_empty() {
            return Self::zero();
        }
        let n = metrics.len() as f64;
        let mut acc = Self::zero();
        for m in metrics {
            acc.snr += m.snr;
            acc.artifact_ratio += m.artifact_ratio;
            acc.stability += m.stability;
            acc.frequency_quality += m.frequency_quality;
            acc.overall += m.overall;
        }
        Self {
            snr: acc.snr / n,
            artifact_ratio: acc.artifact_ratio / n,
            stability: acc.stability / n,
            frequency_quality: acc.frequency_quality / n,
            overall: acc.overall / n,
        }
    }
}

/// Runtime state of a gate, updated once per tick by its owner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GateState {
    pub pressure: f64,
    pub velocity: f64,
    pub flow_rate: f64,
    pub turbulence: f64,
    pub efficiency: f64,
    pub adaptation_level: f64,
}

/// Tunable coefficients of a gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateCoefficients {
    pub gain: f64,
    pub smoothing: f64,
    pub threshold: f64,
    pub mix: f64,
}

impl GateCoefficients {
    /// Clamp each coefficient into `[min, max]`
    pub fn clamp(self, min: &GateCoefficients, max: &GateCoefficients) -> Self {
        Self {
            gain: self.gain.clamp(min.gain, max.gain),
            smoothing: self.smoothing.clamp(min.smoothing, max.smoothing),
            threshold: self.threshold.clamp(min.threshold, max.threshold),
            mix: self.mix.clamp(min.mix, max.mix),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.gain.is_finite()
            && self.smoothing.is_finite()
            && self.threshold.is_finite()
            && self.mix.is_finite()
    }

    /// Move `self` toward `target` by `alpha` (exponential smoothing)
    pub fn blend_toward(&self, target: &GateCoefficients, alpha: f64) -> Self {
        let lerp = |a: f64, b: f64| a + alpha * (b - a);
        Self {
            gain: lerp(self.gain, target.gain),
            smoothing: lerp(self.smoothing, target.smoothing),
            threshold: lerp(self.threshold, target.threshold),
            mix: lerp(self.mix, target.mix),
        }
    }

    /// Largest per-coefficient change relative to the coefficient range
    pub fn relative_distance(
        &self,
        other: &GateCoefficients,
        min: &GateCoefficients,
        max: &GateCoefficients,
    ) -> f64 {
        let rel = |a: f64, b: f64, lo: f64, hi: f64| {
            let span = hi - lo;
            if span > 0.0 {
                (a - b).abs() / span
            } else {
                0.0
            }
        };
        rel(self.gain, other.gain, min.gain, max.gain)
            .max(rel(self.smoothing, other.smoothing, min.smoothing, max.smoothing))
            .max(rel(self.threshold, other.threshold, min.threshold, max.threshold))
            .max(rel(self.mix, other.mix, min.mix, max.mix))
    }
}

/// Compact summary of a window, stored in experiences
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub rms: f64,
    pub peak: f64,
}

impl SignalSummary {
    /// Summarise a window; empty windows summarise to zeros.
    ///
    /// Samples are scaled by the peak before summing, so any finite window
    /// gives a finite summary.
    pub fn of(samples: &[f64]) -> Self {
        let peak = samples.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
        if samples.is_empty() || peak == 0.0 || !peak.is_finite() {
            return Self {
                peak: if peak.is_finite() { peak } else { 0.0 },
                ..Self::default()
            };
        }
        let n = samples.len() as f64;
        let mean = samples.iter().map(|x| x / peak).sum::<f64>() / n;
        let var = samples.iter().map(|x| (x / peak - mean).powi(2)).sum::<f64>() / n;
        let ms = samples.iter().map(|x| (x / peak).powi(2)).sum::<f64>() / n;
        Self {
            mean: mean * peak,
            std_dev: var.sqrt() * peak,
            rms: ms.sqrt() * peak,
            peak,
        }
    }

    /// Average of several summaries (one per channel)
    pub fn mean_of(summaries: &[SignalSummary]) -> Self {
        if summaries.is_empty() {
            return Self::default();
        }
        let n = summaries.len() as f64;
        let avg = |f: fn(&SignalSummary) -> f64| summaries.iter().map(|s| f(s) / n).sum::<f64>();
        Self {
            mean: avg(|s| s.mean),
            std_dev: avg(|s| s.std_dev),
            rms: avg(|s| s.rms),
            peak: summaries.iter().map(|s| s.peak).fold(0.0, f64::max),
        }
    }
}

/// Fixed-capacity rolling window with a running sum.
///
/// Storage is allocated once; `push` is O(1) and overwrites the oldest value.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: Vec<f64>,
    head: usize,
    len: usize,
    sum: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
            sum: 0.0,
        }
    }

    /// Push a value, returning the value it displaced (if the window was full)
    #[inline]
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let cap = self.values.len();
        let evicted = if self.len == cap {
            Some(self.values[self.head])
        } else {
            None
        };
        if let Some(old) = evicted {
            self.sum -= old;
        } else {
            self.len += 1;
        }
        self.values[self.head] = value;
        self.sum += value;
        self.head = (self.head + 1) % cap;
        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Mean of the retained values, 0.0 when empty.
    ///
    /// Recomputed from the retained values rather than the running sum so
    /// long streams do not accumulate drift.
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.iter().sum::<f64>() / self.len as f64
        }
    }

    /// Running-sum mean; O(1) but may drift on very long streams
    #[inline]
    pub fn fast_mean(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.sum / self.len as f64
        }
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let cap = self.values.len();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).map(move |i| self.values[(start + i) % cap])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.sum = 0.0;
    }
}

/// Per-tick optional metadata supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickMetadata {
    #[serde(default)]
    pub channel_names: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Per-gate metrics produced while processing one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateMetrics {
    pub gate: GateId,
    pub kind: GateKind,
    pub efficiency: f64,
    pub elapsed_us: f64,
    /// Coefficients after the kernel's quality modulation
    pub effective: GateCoefficients,
    /// Gate output was non-finite and the input was passed through instead
    pub fell_back: bool,
}

/// Gate state as reported in a result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateStateSnapshot {
    pub gate: GateId,
    pub kind: GateKind,
    pub state: GateState,
}

/// Everything the engine reports for one tick
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub tick: u64,
    pub channel_names: Vec<String>,
    pub enhanced_signal: Vec<Vec<f64>>,
    /// Mean input quality over all channels
    pub quality: QualityMetrics,
    pub channel_quality: Vec<QualityMetrics>,
    pub gate_states: Vec<GateStateSnapshot>,
    /// Gate order used for this tick
    pub order: Vec<GateId>,
    pub adaptation_score: f64,
    pub processing_latency_ms: f64,
    pub latency_overrun: bool,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}
