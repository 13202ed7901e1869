//! Signal quality assessment
//!
//! Computes [`QualityMetrics`] for one window:
//! - **snr**: share of non-DC spectral power below the noise cutoff
//! - **artifact_ratio**: fraction of samples beyond `artifact_sigma`·σ
//! - **stability**: `1 / (1 + CV)` of per-second sub-window variances
//! - **frequency_quality**: penalises dominance of a single canonical band
//! - **overall**: fixed-weight sum of the above
//!
//! Assessment is a pure function of the window, the sampling rate and the
//! config. Degenerate windows (empty, constant, non-finite, or with a
//! variance beyond `f64`) score zero.

use crate::analysis::fft::FftAnalyzer;
use crate::config::QualityConfig;
use crate::error::{EngineError, Result};
use crate::types::QualityMetrics;

/// Canonical EEG bands (Hz): delta, theta, alpha, beta
pub const CANONICAL_BANDS: [(f64, f64); 4] = [(0.5, 4.0), (4.0, 8.0), (8.0, 13.0), (13.0, 30.0)];

/// Relative variance below which a window is treated as constant
const CONSTANT_VARIANCE: f64 = 1e-24;

/// Quality assessor with reusable FFT buffers
pub struct SignalQualityAssessor {
    config: QualityConfig,
    fft: FftAnalyzer,
}

impl SignalQualityAssessor {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            fft: FftAnalyzer::new(),
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Assess one window sampled at `sampling_rate` Hz
    pub fn assess(&mut self, window: &[f64], sampling_rate: f64) -> QualityMetrics {
        let (mean, std_dev) = match moments(window) {
            Ok(m) => m,
            Err(e) => {
                tracing::trace!("{}, scoring zero", e);
                return QualityMetrics::zero();
            }
        };
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return QualityMetrics::zero();
        }

        let artifact_ratio = artifact_ratio(window, mean, std_dev, self.config.artifact_sigma);
        let stability = stability(window, sampling_rate);

        let spectrum = self.fft.power_spectrum(window, sampling_rate);
        let nyquist = sampling_rate / 2.0;
        let cutoff = self.config.snr_cutoff_hz.min(nyquist);
        let signal = spectrum.band_power(0.0, cutoff);
        let noise = spectrum.band_power(cutoff, f64::INFINITY);
        let snr = ratio(signal, signal + noise);

        let mut bands = [0.0; 4];
        for (slot, (lo, hi)) in bands.iter_mut().zip(CANONICAL_BANDS) {
            *slot = spectrum.band_power(lo, hi);
        }
        let frequency_quality = band_spread(&bands);

        let w = &self.config.weights;
        let overall = (w.snr * snr
            + w.artifact * (1.0 - artifact_ratio)
            + w.stability * stability
            + w.frequency * frequency_quality)
            .clamp(0.0, 1.0);

        QualityMetrics {
            snr,
            artifact_ratio,
            stability,
            frequency_quality,
            overall,
        }
    }
}

/// Stateless convenience wrapper around [`SignalQualityAssessor::assess`]
pub fn assess(window: &[f64], sampling_rate: f64, config: &QualityConfig) -> QualityMetrics {
    SignalQualityAssessor::new(config.clone()).assess(window, sampling_rate)
}

/// Mean and standard deviation of a window that can be scored
fn moments(window: &[f64]) -> Result<(f64, f64)> {
    if window.is_empty() {
        return Err(EngineError::DegenerateInput("empty window".into()));
    }
    if window.iter().any(|x| !x.is_finite()) {
        return Err(EngineError::DegenerateInput("non-finite sample".into()));
    }
    let n = window.len() as f64;
    let mean = window.iter().map(|x| x / n).sum::<f64>();
    let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    if !var.is_finite() {
        return Err(EngineError::DegenerateInput("variance overflows".into()));
    }
    if var <= CONSTANT_VARIANCE * (1.0 + mean * mean) {
        return Err(EngineError::DegenerateInput("constant window".into()));
    }
    Ok((mean, var.sqrt()))
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 && num.is_finite() && den.is_finite() {
        (num / den).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn artifact_ratio(window: &[f64], mean: f64, std_dev: f64, sigma: f64) -> f64 {
    let limit = sigma * std_dev;
    let outliers = window.iter().filter(|x| (*x - mean).abs() > limit).count();
    outliers as f64 / window.len() as f64
}

/// `1 / (1 + CV)` of sub-window variances.
///
/// Sub-windows are one second long; windows shorter than two seconds are
/// split in halves. Windows too short to split are treated as stable.
fn stability(window: &[f64], sampling_rate: f64) -> f64 {
    let n = window.len();
    let per_second = sampling_rate.round().max(1.0) as usize;
    let chunk = if n >= 2 * per_second { per_second } else { n / 2 };
    if chunk < 2 {
        return 1.0;
    }

    let mut count = 0usize;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for sub in window.chunks_exact(chunk) {
        let m = sub.iter().sum::<f64>() / chunk as f64;
        let v = sub.iter().map(|x| (x - m).powi(2)).sum::<f64>() / chunk as f64;
        count += 1;
        sum += v;
        sum_sq += v * v;
    }

    let mean_var = sum / count as f64;
    if mean_var <= 0.0 {
        return 0.0;
    }
    let spread = (sum_sq / count as f64 - mean_var * mean_var).max(0.0).sqrt();
    let s = 1.0 / (1.0 + spread / mean_var);
    if s.is_finite() {
        s
    } else {
        0.0
    }
}

/// 1 for power spread evenly over the bands, 0 for a single dominant band
fn band_spread(bands: &[f64; 4]) -> f64 {
    let total: f64 = bands.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return 0.0;
    }
    let max_share = bands.iter().fold(0.0f64, |a, &b| a.max(b)) / total;
    let even = 1.0 / bands.len() as f64;
    ((1.0 - max_share) / (1.0 - even)).clamp(0.0, 1.0)
}
