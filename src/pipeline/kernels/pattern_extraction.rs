//! PatternExtraction kernel: spectral peak retention blended with the input.
//!
//! Bins weaker than `threshold` times the strongest non-DC bin are dropped.
//! The threshold is relaxed for clean windows (`0.5 + 0.5·(1 - snr)`), so a
//! clean window keeps more of its spectrum. The reconstruction is mixed back
//! with the input by `mix` and scaled by `gain`.

use super::{noisiness, KernelContext};
use crate::analysis::FftAnalyzer;
use crate::types::GateCoefficients;

pub struct PatternExtractionKernel {
    fft: FftAnalyzer,
    retained: Vec<f64>,
}

impl PatternExtractionKernel {
    pub fn new() -> Self {
        Self {
            fft: FftAnalyzer::new(),
            retained: Vec::new(),
        }
    }

    pub fn apply(&mut self, ctx: &mut KernelContext) -> GateCoefficients {
        let c = ctx.coefficients;
        let threshold = c.threshold * (0.5 + 0.5 * noisiness(ctx.quality));

        self.fft.retain_peaks(ctx.input, threshold, &mut self.retained);

        ctx.output.clear();
        ctx.output.extend(
            self.retained
                .iter()
                .zip(ctx.input)
                .map(|(&r, &x)| c.gain * (c.mix * r + (1.0 - c.mix) * x)),
        );

        GateCoefficients { threshold, ..*c }
    }
}

impl Default for PatternExtractionKernel {
    fn default() -> Self {
        Self::new()
    }
}
