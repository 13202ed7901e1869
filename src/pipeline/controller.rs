//! Coefficient controller for a single gate.
//!
//! Each tick the gate runs with *trial* coefficients: its current
//! coefficients plus a small deterministic offset per coefficient. The
//! controller remembers the trials and performance of the last few ticks and
//! pulls the current coefficients toward the mean of the best-performing
//! decile:
//!
//! ```text
//! trial_k = clamp(c + spread · u_k, min, max)      u_k ∈ [-1, 1)
//! c       ← clamp(c + α · (mean(top 10% trials) − c), min, max)
//! ```
//!
//! The offsets `u_k` come from a radical-inverse sequence (bases 2, 3, 5, 7)
//! and average to zero, so on a flat performance landscape the target stays
//! centred on `c`. When some direction scores better, the top decile leans
//! that way and `c` follows until the best trials straddle it.

use crate::types::GateCoefficients;
use std::collections::VecDeque;

/// Fraction of the history considered "top performing"
const TOP_FRACTION: f64 = 0.1;

/// Radical-inverse bases for gain, smoothing, threshold and mix offsets
const OFFSET_BASES: [u64; 4] = [2, 3, 5, 7];

#[derive(Debug, Clone, Copy)]
struct Sample {
    coefficients: GateCoefficients,
    performance: f64,
}

/// Bounded-history exponential smoother over top-decile trials
#[derive(Debug, Clone)]
pub struct CoefficientController {
    alpha: f64,
    /// Half-width of the trial offset, per coefficient
    spread: GateCoefficients,
    history: VecDeque<Sample>,
    capacity: usize,
    /// Reused index buffer for ranking
    ranks: Vec<usize>,
}

impl CoefficientController {
    pub fn new(alpha: f64, capacity: usize, spread: GateCoefficients) -> Self {
        let capacity = capacity.max(1);
        let width = |w: f64| if w.is_finite() { w.abs() } else { 0.0 };
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            spread: GateCoefficients {
                gain: width(spread.gain),
                smoothing: width(spread.smoothing),
                threshold: width(spread.threshold),
                mix: width(spread.mix),
            },
            history: VecDeque::with_capacity(capacity),
            capacity,
            ranks: Vec::with_capacity(capacity),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Coefficients to run tick `index` with
    pub fn trial(
        &self,
        current: &GateCoefficients,
        min: &GateCoefficients,
        max: &GateCoefficients,
        index: u64,
    ) -> GateCoefficients {
        let u = |base: u64| 2.0 * radical_inverse(index.wrapping_add(1), base) - 1.0;
        let [bg, bs, bt, bm] = OFFSET_BASES;
        GateCoefficients {
            gain: current.gain + self.spread.gain * u(bg),
            smoothing: current.smoothing + self.spread.smoothing * u(bs),
            threshold: current.threshold + self.spread.threshold * u(bt),
            mix: current.mix + self.spread.mix * u(bm),
        }
        .clamp(min, max)
    }

    /// Remember the coefficients one tick ran with. Non-finite samples are
    /// ignored.
    pub fn record(&mut self, coefficients: GateCoefficients, performance: f64) {
        if !coefficients.is_finite() || !performance.is_finite() {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Sample {
            coefficients,
            performance,
        });
    }

    /// Mean recorded coefficients of the top `ceil(len / 10)` invocations
    pub fn target(&mut self) -> Option<GateCoefficients> {
        let n = self.history.len();
        if n == 0 {
            return None;
        }
        let top = ((n as f64 * TOP_FRACTION).ceil() as usize).clamp(1, n);

        self.ranks.clear();
        self.ranks.extend(0..n);
        let history = &self.history;
        // Best first; newer wins ties.
        self.ranks.sort_unstable_by(|&a, &b| {
            history[b]
                .performance
                .total_cmp(&history[a].performance)
                .then(b.cmp(&a))
        });

        let mut acc = GateCoefficients {
            gain: 0.0,
            smoothing: 0.0,
            threshold: 0.0,
            mix: 0.0,
        };
        for &i in &self.ranks[..top] {
            let c = &history[i].coefficients;
            acc.gain += c.gain;
            acc.smoothing += c.smoothing;
            acc.threshold += c.threshold;
            acc.mix += c.mix;
        }
        let k = top as f64;
        Some(GateCoefficients {
            gain: acc.gain / k,
            smoothing: acc.smoothing / k,
            threshold: acc.threshold / k,
            mix: acc.mix / k,
        })
    }

    /// One smoothing step of `current` toward the current target
    pub fn step(
        &mut self,
        current: &GateCoefficients,
        min: &GateCoefficients,
        max: &GateCoefficients,
    ) -> GateCoefficients {
        match self.target() {
            Some(target) => current.blend_toward(&target, self.alpha).clamp(min, max),
            None => *current,
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Van der Corput radical inverse of `index` in `base`, in [0, 1)
fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let inv = 1.0 / base as f64;
    let mut scale = inv;
    let mut value = 0.0;
    while index > 0 {
        value += (index % base) as f64 * scale;
        index /= base;
        scale *= inv;
    }
    value
}
