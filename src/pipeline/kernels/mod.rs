//! Built-in gate kernels.
//!
//! A kernel is the pure transform inside a gate. It reads the input window,
//! the tick's quality metrics and the gate's current coefficients, writes the
//! output window, and reports the *effective* coefficients it actually used
//! (coefficients modulated by quality). The owning gate reports them in
//! [`GateMetrics`](crate::types::GateMetrics); its controller learns from the
//! unmodulated coefficients it passed in.

pub mod enhancement;
pub mod noise_reduction;
pub mod pattern_extraction;

pub use enhancement::SignalEnhancementKernel;
pub use noise_reduction::NoiseReductionKernel;
pub use pattern_extraction::PatternExtractionKernel;

use crate::types::{GateCoefficients, GateKind, QualityMetrics};

/// Context passed to a kernel for one window.
pub struct KernelContext<'a> {
    /// Input window (finite samples).
    pub input: &'a [f64],
    /// Quality of the tick's input window.
    pub quality: &'a QualityMetrics,
    /// Trial coefficients the gate runs this tick with.
    pub coefficients: &'a GateCoefficients,
    /// Output buffer; the kernel replaces its contents.
    pub output: &'a mut Vec<f64>,
}

/// Enum dispatch for built-in kernels.
pub enum GateKernel {
    SignalEnhancement(SignalEnhancementKernel),
    NoiseReduction(NoiseReductionKernel),
    PatternExtraction(PatternExtractionKernel),
}

impl GateKernel {
    pub fn new(kind: GateKind) -> Self {
        match kind {
            GateKind::SignalEnhancement => {
                GateKernel::SignalEnhancement(SignalEnhancementKernel::new())
            }
            GateKind::NoiseReduction => GateKernel::NoiseReduction(NoiseReductionKernel::new()),
            GateKind::PatternExtraction => {
                GateKernel::PatternExtraction(PatternExtractionKernel::new())
            }
        }
    }

    pub fn kind(&self) -> GateKind {
        match self {
            GateKernel::SignalEnhancement(_) => GateKind::SignalEnhancement,
            GateKernel::NoiseReduction(_) => GateKind::NoiseReduction,
            GateKernel::PatternExtraction(_) => GateKind::PatternExtraction,
        }
    }

    /// Run the kernel, returning the effective coefficients used.
    pub fn apply(&mut self, ctx: &mut KernelContext) -> GateCoefficients {
        match self {
            GateKernel::SignalEnhancement(k) => k.apply(ctx),
            GateKernel::NoiseReduction(k) => k.apply(ctx),
            GateKernel::PatternExtraction(k) => k.apply(ctx),
        }
    }
}

/// Mean and population standard deviation; zeros for an empty window.
pub(crate) fn mean_std(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Lack of confidence in the window, in [0, 1].
#[inline]
pub(crate) fn noisiness(quality: &QualityMetrics) -> f64 {
    (1.0 - quality.snr).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_kind_round_trip() {
        for &kind in GateKind::all() {
            assert_eq!(GateKernel::new(kind).kind(), kind);
        }
    }

    #[test]
    fn test_mean_std() {
        assert_eq!(mean_std(&[]), (0.0, 0.0));
        let (m, s) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(m, 5.0);
        assert_eq!(s, 2.0);
    }
}
