//! NoiseReduction kernel: artifact clipping followed by a single-pole low-pass.
//!
//! Samples further than `threshold·σ` from the mean are clipped to that
//! bound, then filtered with `y[n] = a·x[n] + (1 - a)·y[n-1]` where
//! `1 - a` is the effective smoothing. Smoothing is relaxed for clean windows
//! and strengthened for noisy ones.

use super::{mean_std, noisiness, KernelContext};
use crate::types::GateCoefficients;

/// Effective smoothing never reaches 1 (which would freeze the output)
const MAX_EFFECTIVE_SMOOTHING: f64 = 0.95;

pub struct NoiseReductionKernel;

impl NoiseReductionKernel {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&mut self, ctx: &mut KernelContext) -> GateCoefficients {
        let c = ctx.coefficients;
        let smoothing =
            (c.smoothing * (0.5 + noisiness(ctx.quality))).clamp(0.0, MAX_EFFECTIVE_SMOOTHING);
        let a = 1.0 - smoothing;

        let (mean, std_dev) = mean_std(ctx.input);
        let bound = c.threshold * std_dev;
        let (lo, hi) = (mean - bound, mean + bound);

        ctx.output.clear();
        let mut prev: Option<f64> = None;
        ctx.output.extend(ctx.input.iter().map(|&x| {
            let clipped = if bound > 0.0 { x.clamp(lo, hi) } else { x };
            let y = match prev {
                Some(p) => a * clipped + (1.0 - a) * p,
                None => clipped,
            };
            prev = Some(y);
            c.gain * y
        }));

        GateCoefficients { smoothing, ..*c }
    }
}

impl Default for NoiseReductionKernel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GateKind, QualityMetrics};

    fn run(input: &[f64], snr: f64) -> (Vec<f64>, GateCoefficients) {
        let coefficients = GateKind::NoiseReduction.default_coefficients();
        let quality = QualityMetrics {
            snr,
            ..QualityMetrics::zero()
        };
        let mut output = Vec::new();
        let effective = NoiseReductionKernel::new().apply(&mut KernelContext {
            input,
            quality: &quality,
            coefficients: &coefficients,
            output: &mut output,
        });
        (output, effective)
    }

    #[test]
    fn test_clips_spike() {
        let mut input: Vec<f64> = (0..200).map(|i| (i as f64 * 0.25).sin()).collect();
        input[50] = 100.0;
        let (out, _) = run(&input, 1.0);
        let peak = out.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        assert!(peak < 10.0, "peak {}", peak);
    }

    #[test]
    fn test_attenuates_alternating_noise() {
        let input: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let (out, _) = run(&input, 0.5);
        let in_energy: f64 = input.iter().map(|x| x * x).sum();
        let out_energy: f64 = out.iter().skip(1).map(|x| x * x).sum();
        assert!(out_energy < 0.5 * in_energy);
    }

    #[test]
    fn test_smoothing_tracks_noisiness() {
        let input = vec![0.0, 1.0, 0.0, -1.0];
        let (_, clean) = run(&input, 1.0);
        let (_, noisy) = run(&input, 0.0);
        assert!(noisy.smoothing > clean.smoothing);
        assert!(noisy.smoothing <= MAX_EFFECTIVE_SMOOTHING);
    }
}
