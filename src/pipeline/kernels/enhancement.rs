//! SignalEnhancement kernel: DC removal, adaptive gain, soft limiting.
//!
//! The gain is boosted for noisy windows (`gain · (1 + 0.5·(1 - snr))`) and
//! samples beyond `threshold·σ` of the amplified signal are compressed
//! rather than hard clipped, so large excursions stay monotonic.

use super::{mean_std, noisiness, KernelContext};
use crate::types::GateCoefficients;

/// Extra gain applied to a fully noisy window
const NOISE_GAIN_BOOST: f64 = 0.5;

pub struct SignalEnhancementKernel;

impl SignalEnhancementKernel {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&mut self, ctx: &mut KernelContext) -> GateCoefficients {
        let c = ctx.coefficients;
        let gain = c.gain * (1.0 + NOISE_GAIN_BOOST * noisiness(ctx.quality));
        let (mean, std_dev) = mean_std(ctx.input);
        let limit = c.threshold * std_dev * gain;

        ctx.output.clear();
        ctx.output.extend(ctx.input.iter().map(|&x| {
            let y = gain * (x - mean);
            soft_limit(y, limit)
        }));

        GateCoefficients { gain, ..*c }
    }
}

impl Default for SignalEnhancementKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity inside `±limit`, compressive beyond it. Never exceeds `2·limit`.
#[inline]
fn soft_limit(y: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return y;
    }
    let mag = y.abs();
    if mag <= limit {
        return y;
    }
    let excess = mag - limit;
    let compressed = limit + excess / (1.0 + excess / limit);
    compressed.copysign(y)
}
