//! Venturi gate: one adaptive processing stage.
//!
//! A gate wraps a [`GateKernel`] with runtime state and a coefficient
//! controller. Processing is split in two phases:
//!
//! 1. [`VenturiGate::evaluate`] runs the kernel with the tick's trial
//!    coefficients, measures the output and returns a [`PendingUpdate`].
//!    Gate state, coefficients and counters are untouched.
//! 2. [`VenturiGate::commit`] applies one update per tick and steps the
//!    controller. Updates from several channels are folded with
//!    [`PendingUpdate::merge`] first.
//!
//! A tick that is abandoned between the two phases leaves the gate exactly as
//! it was. Every state field is finite and within the configured bounds after
//! any commit or restore.

use crate::config::GateConfig;
use crate::error::EngineError;
use crate::pipeline::controller::CoefficientController;
use crate::pipeline::kernels::{GateKernel, KernelContext};
use crate::types::{
    GateCoefficients, GateId, GateKind, GateMetrics, GateState, QualityMetrics,
};
use std::time::Instant;

/// Smoothing of `adaptation_level` across commits
const ADAPTATION_SMOOTHING: f64 = 0.1;

/// State change produced by one or more evaluations, applied by
/// [`VenturiGate::commit`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingUpdate {
    pub gate: GateId,
    pub state: GateState,
    /// Trial coefficients and invocation performance, `None` when every
    /// evaluation fell back
    pub sample: Option<(GateCoefficients, f64)>,
    /// Evaluations folded into this update
    pub evaluations: u32,
    /// Evaluations that fell back to the input
    pub fallbacks: u32,
}

impl PendingUpdate {
    /// Fold one gate's per-channel updates into a single update.
    ///
    /// The state is the field-wise mean (`flow_rate` recomputed from the mean
    /// pressure and velocity); the performance is the mean over evaluations
    /// that did not fall back. `None` for an empty slice.
    pub fn merge(updates: &[PendingUpdate]) -> Option<PendingUpdate> {
        let first = updates.first()?;
        if updates.len() == 1 {
            return Some(*first);
        }
        debug_assert!(updates.iter().all(|u| u.gate == first.gate));

        let n = updates.len() as f64;
        let mean = |f: fn(&GateState) -> f64| updates.iter().map(|u| f(&u.state) / n).sum::<f64>();
        let pressure = mean(|s| s.pressure);
        let velocity = mean(|s| s.velocity);
        let state = GateState {
            pressure,
            velocity,
            flow_rate: pressure * velocity,
            turbulence: mean(|s| s.turbulence),
            efficiency: mean(|s| s.efficiency),
            adaptation_level: first.state.adaptation_level,
        };

        let samples: Vec<(GateCoefficients, f64)> =
            updates.iter().filter_map(|u| u.sample).collect();
        let sample = samples.first().map(|&(trial, _)| {
            let k = samples.len() as f64;
            (trial, samples.iter().map(|(_, p)| p / k).sum::<f64>())
        });

        Some(PendingUpdate {
            gate: first.gate,
            state,
            sample,
            evaluations: updates.iter().map(|u| u.evaluations).sum(),
            fallbacks: updates.iter().map(|u| u.fallbacks).sum(),
        })
    }
}

/// Result of [`VenturiGate::evaluate`]
#[derive(Debug, Clone, Copy)]
pub struct GateOutcome {
    pub pending: PendingUpdate,
    pub metrics: GateMetrics,
}

pub struct VenturiGate {
    id: GateId,
    name: String,
    kernel: GateKernel,
    state: GateState,
    coefficients: GateCoefficients,
    min: GateCoefficients,
    max: GateCoefficients,
    controller: CoefficientController,
    /// Trial coefficients for the next tick
    trial: GateCoefficients,
    min_pressure: f64,
    max_pressure: f64,
    max_velocity: f64,
    invocations: u64,
    fallbacks: u64,
}

impl VenturiGate {
    pub fn new(id: GateId, config: &GateConfig) -> Self {
        let (min, max) = config.kind.coefficient_bounds();
        let mask = config.kind.tuned_mask();
        let spread = |lo: f64, hi: f64, used: f64| config.exploration * (hi - lo) * used;
        let controller = CoefficientController::new(
            config.learning_rate,
            config.controller_history,
            GateCoefficients {
                gain: spread(min.gain, max.gain, mask.gain),
                smoothing: spread(min.smoothing, max.smoothing, mask.smoothing),
                threshold: spread(min.threshold, max.threshold, mask.threshold),
                mix: spread(min.mix, max.mix, mask.mix),
            },
        );
        let coefficients = config.initial_coefficients();
        let trial = controller.trial(&coefficients, &min, &max, 0);
        Self {
            id,
            name: config.display_name(),
            kernel: GateKernel::new(config.kind),
            state: GateState::default(),
            coefficients,
            min,
            max,
            controller,
            trial,
            min_pressure: config.min_pressure,
            max_pressure: config.max_pressure,
            max_velocity: config.max_velocity,
            invocations: 0,
            fallbacks: 0,
        }
    }

    pub fn id(&self) -> GateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GateKind {
        self.kernel.kind()
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn coefficients(&self) -> &GateCoefficients {
        &self.coefficients
    }

    /// Coefficients the next evaluation runs with
    pub fn trial_coefficients(&self) -> &GateCoefficients {
        &self.trial
    }

    /// Number of committed ticks
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Number of committed evaluations that fell back to the input
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    /// Transform `input` into `output` and measure the result.
    ///
    /// Non-finite kernel output is replaced by the input (non-finite input
    /// samples become 0.0) and reported with `efficiency = 0`.
    pub fn evaluate(
        &mut self,
        input: &[f64],
        quality: &QualityMetrics,
        output: &mut Vec<f64>,
    ) -> GateOutcome {
        let started = Instant::now();
        let effective = self.kernel.apply(&mut KernelContext {
            input,
            quality,
            coefficients: &self.trial,
            output,
        });
        let elapsed = started.elapsed().as_secs_f64();

        let fell_back = output.len() != input.len() || output.iter().any(|y| !y.is_finite());
        if fell_back {
            let err = EngineError::NonFiniteOutput {
                gate: self.name.clone(),
            };
            tracing::warn!(kind = %self.kind(), "{}, passing input through", err);
            output.clear();
            output.extend(input.iter().map(|&x| if x.is_finite() { x } else { 0.0 }));
        }

        let velocity = if elapsed > 0.0 {
            (1.0 / elapsed).min(self.max_velocity)
        } else {
            self.max_velocity
        };
        let efficiency = if fell_back {
            0.0
        } else {
            projection_efficiency(input, output)
        };

        let state = self.bounded(GateState {
            pressure: mean_abs(output),
            velocity,
            flow_rate: 0.0,
            turbulence: turbulence(output),
            efficiency,
            adaptation_level: self.state.adaptation_level,
        });
        let sample = (!fell_back).then(|| (self.trial, invocation_performance(&state)));

        GateOutcome {
            pending: PendingUpdate {
                gate: self.id,
                state,
                sample,
                evaluations: 1,
                fallbacks: u32::from(fell_back),
            },
            metrics: GateMetrics {
                gate: self.id,
                kind: self.kind(),
                efficiency: state.efficiency,
                elapsed_us: elapsed * 1e6,
                effective,
                fell_back,
            },
        }
    }

    /// Apply the tick's update produced by [`evaluate`](Self::evaluate)
    /// (merged across channels when there are several).
    pub fn commit(&mut self, pending: PendingUpdate) {
        debug_assert_eq!(pending.gate, self.id);
        let mut state = pending.state;

        if let Some((trial, performance)) = pending.sample {
            self.controller.record(trial, performance);
        }
        let next = self
            .controller
            .step(&self.coefficients, &self.min, &self.max);
        let moved = self
            .coefficients
            .relative_distance(&next, &self.min, &self.max)
            .clamp(0.0, 1.0);
        self.coefficients = next;

        state.adaptation_level = (1.0 - ADAPTATION_SMOOTHING) * self.state.adaptation_level
            + ADAPTATION_SMOOTHING * moved;
        self.state = self.bounded(state);
        self.invocations += 1;
        self.fallbacks += u64::from(pending.fallbacks);
        self.trial = self
            .controller
            .trial(&self.coefficients, &self.min, &self.max, self.invocations);
    }

    /// Evaluate and commit in one step.
    pub fn process(&mut self, input: &[f64], quality: &QualityMetrics) -> Vec<f64> {
        let mut output = Vec::with_capacity(input.len());
        let outcome = self.evaluate(input, quality, &mut output);
        self.commit(outcome.pending);
        output
    }

    /// Restore persisted state. State and coefficients are clamped into
    /// bounds and the controller history is cleared.
    pub fn restore(&mut self, state: GateState, coefficients: GateCoefficients) {
        self.state = self.bounded(state);
        self.coefficients = if coefficients.is_finite() {
            coefficients.clamp(&self.min, &self.max)
        } else {
            self.coefficients
        };
        self.controller.clear();
        self.trial = self
            .controller
            .trial(&self.coefficients, &self.min, &self.max, self.invocations);
    }

    /// Clamp every field into its configured range. Non-finite fields become
    /// the lower bound and `flow_rate` is recomputed as pressure × velocity.
    fn bounded(&self, state: GateState) -> GateState {
        let within = |v: f64, lo: f64, hi: f64| if v.is_finite() { v.clamp(lo, hi) } else { lo };
        let pressure = within(state.pressure, self.min_pressure, self.max_pressure);
        let velocity = within(state.velocity, 0.0, self.max_velocity);
        GateState {
            pressure,
            velocity,
            flow_rate: pressure * velocity,
            turbulence: within(state.turbulence, 0.0, 1.0),
            efficiency: within(state.efficiency, 0.0, 1.0),
            adaptation_level: within(state.adaptation_level, 0.0, 1.0),
        }
    }
}

impl std::fmt::Debug for VenturiGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenturiGate")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("state", &self.state)
            .field("coefficients", &self.coefficients)
            .finish()
    }
}

/// Score of a single invocation, used to rank controller history
#[inline]
fn invocation_performance(state: &GateState) -> f64 {
    0.5 * state.efficiency + 0.5 * (1.0 - state.turbulence)
}

/// Mean magnitude. Terms are divided before summing so the result stays
/// finite for any finite window.
fn mean_abs(samples: &[f64]) -> f64 {
    let n = samples.len() as f64;
    samples.iter().map(|y| y.abs() / n).sum::<f64>()
}

/// Share of the output energy that lies along the input: `cos²(x, y)` of the
/// mean-removed windows.
fn projection_efficiency(input: &[f64], output: &[f64]) -> f64 {
    let n = input.len().min(output.len());
    if n == 0 {
        return 0.0;
    }
    let mx = input[..n].iter().sum::<f64>() / n as f64;
    let my = output[..n].iter().sum::<f64>() / n as f64;

    let (mut dot, mut ex, mut ey) = (0.0, 0.0, 0.0);
    for (x, y) in input[..n].iter().zip(&output[..n]) {
        let (x, y) = (x - mx, y - my);
        dot += x * y;
        ex += x * x;
        ey += y * y;
    }
    if ex <= 0.0 || ey <= 0.0 {
        return 0.0;
    }
    let e = dot * dot / (ex * ey);
    if e.is_finite() {
        e.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Mean absolute first difference relative to the mean magnitude
fn turbulence(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let level = mean_abs(samples);
    if level <= 0.0 {
        return 0.0;
    }
    // Half-differences: |a - b| / 2 cannot overflow.
    let steps = (samples.len() - 1) as f64;
    let half_diff = samples
        .windows(2)
        .map(|w| (w[1] / 2.0 - w[0] / 2.0).abs() / steps)
        .sum::<f64>();
    (half_diff / level).clamp(0.0, 1.0)
}
