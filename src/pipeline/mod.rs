//! Adaptive gate pipeline.
//!
//! An ordered cascade of [`VenturiGate`]s plus a rolling per-gate efficiency
//! history that drives periodic reordering.
//!
//! # Architecture
//!
//! ```text
//!          serial                         parallel
//! window ─► [g0] ─► [g1] ─► [g2] ─►   window ─┬─► [g0] ─┐
//!                                            ├─► [g1] ─┼─► Σ wᵢ·yᵢ / Σ wᵢ
//!                                            └─► [g2] ─┘
//! ```
//!
//! # Design
//!
//! - **Enum dispatch**: every gate holds a `GateKernel` enum, no trait objects.
//! - **Snapshot order**: each `process_*` call reads the `Arc<PipelineOrder>`
//!   once; a concurrent [`GatePipeline::reorder`] only affects later calls.
//! - **Two-phase updates**: processing yields [`PendingUpdate`]s that the
//!   engine commits after the tick succeeds, once per gate per tick.
//! - **Reusable buffers**: [`GatePipeline::process_serial_into`] writes into
//!   a caller-owned [`PipelineRun`].

pub mod controller;
pub mod gate;
pub mod kernels;
pub mod order;

pub use controller::CoefficientController;
pub use gate::{GateOutcome, PendingUpdate, VenturiGate};
pub use kernels::{GateKernel, KernelContext};
pub use order::{OrderCell, PipelineOrder};

use crate::backend::WorkerPool;
use crate::config::GateConfig;
use crate::error::{EngineError, Result};
use crate::types::{
    GateCoefficients, GateId, GateKind, GateMetrics, GateState, GateStateSnapshot,
    QualityMetrics, RollingWindow,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Output of one pass over the pipeline
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Final combined output
    pub output: Vec<f64>,
    /// Per-gate outputs, in execution order
    pub intermediates: Vec<Vec<f64>>,
    /// Per-gate metrics, in execution order
    pub metrics: Vec<GateMetrics>,
    /// Updates to commit once the tick succeeds
    pub pending: Vec<PendingUpdate>,
    /// Order used for this pass
    pub order: Arc<PipelineOrder>,
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            intermediates: Vec::new(),
            metrics: Vec::new(),
            pending: Vec::new(),
            order: Arc::new(PipelineOrder::declaration(0)),
        }
    }

    /// Mean gate efficiency of this pass, 0.0 without gates
    pub fn mean_efficiency(&self) -> f64 {
        if self.metrics.is_empty() {
            0.0
        } else {
            self.metrics.iter().map(|m| m.efficiency).sum::<f64>() / self.metrics.len() as f64
        }
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GatePipeline {
    gates: Vec<Arc<Mutex<VenturiGate>>>,
    kinds: Vec<GateKind>,
    order: OrderCell,
    efficiency: Mutex<Vec<RollingWindow>>,
    reorder_interval: u64,
    ticks: AtomicU64,
}

impl GatePipeline {
    /// Build gates from config; `GateId`s follow declaration order.
    pub fn new(configs: &[GateConfig], history: usize, reorder_interval: u64) -> Self {
        let gates: Vec<_> = configs
            .iter()
            .enumerate()
            .map(|(i, c)| Arc::new(Mutex::new(VenturiGate::new(GateId(i as u32), c))))
            .collect();
        let kinds = configs.iter().map(|c| c.kind).collect();
        let n = gates.len();

        Self {
            gates,
            kinds,
            order: OrderCell::new(n),
            efficiency: Mutex::new((0..n).map(|_| RollingWindow::new(history)).collect()),
            reorder_interval: reorder_interval.max(1),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Current order
    pub fn order(&self) -> Arc<PipelineOrder> {
        self.order.snapshot()
    }

    /// Lock a gate for inspection
    pub fn gate(&self, id: GateId) -> Result<MutexGuard<'_, VenturiGate>> {
        let gate = self
            .gates
            .get(id.index())
            .ok_or_else(|| EngineError::Config(format!("unknown gate {}", id)))?;
        lock(gate.as_ref(), "gate")
    }

    /// Run the gates in order, each consuming the previous output.
    pub fn process_serial(&self, window: &[f64], quality: &QualityMetrics) -> Result<PipelineRun> {
        let mut run = PipelineRun::new();
        self.process_serial_into(window, quality, &mut run)?;
        Ok(run)
    }

    /// [`process_serial`](Self::process_serial) into a reused [`PipelineRun`].
    pub fn process_serial_into(
        &self,
        window: &[f64],
        quality: &QualityMetrics,
        run: &mut PipelineRun,
    ) -> Result<()> {
        let order = self.order.snapshot();
        run.metrics.clear();
        run.pending.clear();
        run.intermediates.resize_with(order.gates.len(), Vec::new);

        for (step, &id) in order.gates.iter().enumerate() {
            let (done, rest) = run.intermediates.split_at_mut(step);
            let input: &[f64] = match done.last() {
                Some(prev) => prev.as_slice(),
                None => window,
            };
            let mut gate = self.gate(id)?;
            let outcome = gate.evaluate(input, quality, &mut rest[0]);
            run.metrics.push(outcome.metrics);
            run.pending.push(outcome.pending);
        }

        run.output.clear();
        match run.intermediates.last() {
            Some(last) => run.output.extend_from_slice(last),
            None => run.output.extend_from_slice(window),
        }
        run.order = order;
        Ok(())
    }

    /// Run every gate on the same input on `pool` and combine the outputs
    /// weighted by efficiency (plain mean if every efficiency is zero).
    pub fn process_parallel(
        &self,
        pool: &WorkerPool,
        window: &[f64],
        quality: &QualityMetrics,
    ) -> Result<PipelineRun> {
        let order = self.order.snapshot();
        let input: Arc<[f64]> = Arc::from(window);
        let quality = *quality;

        let jobs: Vec<_> = order
            .gates
            .iter()
            .map(|id| (Arc::clone(&self.gates[id.index()]), Arc::clone(&input)))
            .collect();

        let results = pool.map(jobs, move |(gate, input)| {
            let mut gate = lock(gate.as_ref(), "gate")?;
            let mut output = Vec::with_capacity(input.len());
            let outcome = gate.evaluate(&input, &quality, &mut output);
            Ok::<_, EngineError>((output, outcome))
        })?;

        let mut run = PipelineRun::new();
        for result in results {
            let (output, outcome) = result?;
            run.intermediates.push(output);
            run.metrics.push(outcome.metrics);
            run.pending.push(outcome.pending);
        }

        combine_weighted(&run.intermediates, &run.metrics, window, &mut run.output);
        run.order = order;
        Ok(run)
    }

    /// Commit one tick's pending updates.
    ///
    /// Updates are grouped by gate and each group is folded with
    /// [`PendingUpdate::merge`], so every gate commits exactly once per call
    /// whatever the channel count. One efficiency sample is recorded per gate.
    /// Unknown gate ids are rejected before anything is applied.
    pub fn commit(&self, pending: &[PendingUpdate]) -> Result<()> {
        let n = self.gates.len();
        let mut groups: Vec<Vec<PendingUpdate>> = vec![Vec::new(); n];
        for update in pending {
            groups
                .get_mut(update.gate.index())
                .ok_or_else(|| EngineError::Config(format!("unknown gate {}", update.gate)))?
                .push(*update);
        }

        let mut merged = Vec::with_capacity(n);
        for group in &groups {
            if let Some(update) = PendingUpdate::merge(group) {
                self.gate(update.gate)?.commit(update);
                merged.push(update);
            }
        }

        let mut history = lock(&self.efficiency, "efficiency history")?;
        for update in merged {
            history[update.gate.index()].push(update.state.efficiency);
        }
        Ok(())
    }

    /// Append one efficiency sample for `id`
    pub fn record_efficiency(&self, id: GateId, efficiency: f64) -> Result<()> {
        let mut history = lock(&self.efficiency, "efficiency history")?;
        let window = history
            .get_mut(id.index())
            .ok_or_else(|| EngineError::Config(format!("unknown gate {}", id)))?;
        window.push(efficiency);
        Ok(())
    }

    /// Mean efficiency of `id` over the retained history
    pub fn mean_efficiency(&self, id: GateId) -> Result<f64> {
        let history = lock(&self.efficiency, "efficiency history")?;
        history
            .get(id.index())
            .map(RollingWindow::mean)
            .ok_or_else(|| EngineError::Config(format!("unknown gate {}", id)))
    }

    /// Count a finished tick and reorder when the interval elapses.
    ///
    /// Returns `true` if a reorder ran.
    pub fn on_tick(&self) -> Result<bool> {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % self.reorder_interval == 0 {
            self.reorder()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Sort gates by descending mean efficiency (ties keep declaration order)
    /// and publish the result if it differs from the current order.
    pub fn reorder(&self) -> Result<Arc<PipelineOrder>> {
        let means: Vec<f64> = {
            let history = lock(&self.efficiency, "efficiency history")?;
            history.iter().map(RollingWindow::mean).collect()
        };

        let mut gates: Vec<GateId> = (0..means.len() as u32).map(GateId).collect();
        gates.sort_by(|a, b| means[b.index()].total_cmp(&means[a.index()]));

        let current = self.order.snapshot();
        if current.gates == gates {
            return Ok(current);
        }
        let version = self.order.publish(gates)?;
        let order = self.order.snapshot();
        tracing::debug!(version, order = ?order.gates, "pipeline reordered");
        Ok(order)
    }

    /// Replace the current order, e.g. from a snapshot
    pub fn restore_order(&self, gates: Vec<GateId>) -> Result<()> {
        self.order.publish(gates).map(|_| ())
    }

    /// Restore one gate and seed its efficiency history with the restored
    /// (clamped) efficiency
    pub fn restore_gate(
        &self,
        id: GateId,
        state: GateState,
        coefficients: GateCoefficients,
    ) -> Result<()> {
        let efficiency = {
            let mut gate = self.gate(id)?;
            gate.restore(state, coefficients);
            gate.state().efficiency
        };
        let mut history = lock(&self.efficiency, "efficiency history")?;
        if let Some(window) = history.get_mut(id.index()) {
            window.clear();
            window.push(efficiency);
        }
        Ok(())
    }

    /// Gate states in declaration order
    pub fn gate_states(&self) -> Result<Vec<GateStateSnapshot>> {
        self.kinds
            .iter()
            .enumerate()
            .map(|(i, &kind)| {
                let id = GateId(i as u32);
                Ok(GateStateSnapshot {
                    gate: id,
                    kind,
                    state: *self.gate(id)?.state(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for GatePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePipeline")
            .field("kinds", &self.kinds)
            .field("order", &self.order.snapshot())
            .field("reorder_interval", &self.reorder_interval)
            .finish()
    }
}

/// Lock `mutex`, mapping poisoning to [`EngineError::Poisoned`]
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| EngineError::Poisoned(format!("{} lock", what)))
}

/// Efficiency-weighted average of the gate outputs, written into `out`.
/// Falls back to the plain mean when no gate has positive efficiency and to
/// `window` when there are no gates.
fn combine_weighted(outputs: &[Vec<f64>], metrics: &[GateMetrics], window: &[f64], out: &mut Vec<f64>) {
    out.clear();
    if outputs.is_empty() {
        out.extend_from_slice(window);
        return;
    }

    let total: f64 = metrics.iter().map(|m| m.efficiency.max(0.0)).sum();
    let uniform = 1.0 / outputs.len() as f64;
    let weight = |i: usize| {
        if total > 0.0 {
            metrics[i].efficiency.max(0.0) / total
        } else {
            uniform
        }
    };

    out.resize(window.len(), 0.0);
    for (i, output) in outputs.iter().enumerate() {
        let w = weight(i);
        for (acc, y) in out.iter_mut().zip(output) {
            *acc += w * y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_gates;
    use std::f64::consts::PI;

    fn window() -> Vec<f64> {
        (0..250)
            .map(|i| (2.0 * PI * 10.0 * i as f64 / 250.0).sin())
            .collect()
    }

    fn quality() -> QualityMetrics {
        QualityMetrics {
            snr: 0.9,
            ..QualityMetrics::zero()
        }
    }

    #[test]
    fn test_serial_chains_gates() {
        let pipeline = GatePipeline::new(&default_gates(), 100, 25);
        let run = pipeline.process_serial(&window(), &quality()).unwrap();
        assert_eq!(run.intermediates.len(), 3);
        assert_eq!(run.metrics.len(), 3);
        assert_eq!(run.pending.len(), 3);
        assert_eq!(run.output, run.intermediates[2]);
        assert_eq!(run.order.gates, vec![GateId(0), GateId(1), GateId(2)]);
    }

    #[test]
    fn test_serial_does_not_commit() {
        let pipeline = GatePipeline::new(&default_gates(), 100, 25);
        let before = pipeline.gate_states().unwrap();
        let run = pipeline.process_serial(&window(), &quality()).unwrap();
        assert_eq!(pipeline.gate_states().unwrap(), before);

        pipeline.commit(&run.pending).unwrap();
        let after = pipeline.gate_states().unwrap();
        assert_ne!(after, before);
        assert!(pipeline.mean_efficiency(GateId(0)).unwrap() > 0.0);
    }

    #[test]
    fn test_commit_folds_channels_per_gate() {
        let pipeline = GatePipeline::new(&default_gates(), 100, 25);
        let mut pending = Vec::new();
        for _ in 0..4 {
            pending.extend(pipeline.process_serial(&window(), &quality()).unwrap().pending);
        }
        assert_eq!(pending.len(), 12);

        pipeline.commit(&pending).unwrap();
        for id in 0..3u32 {
            assert_eq!(pipeline.gate(GateId(id)).unwrap().invocations(), 1);
            assert_eq!(lock(&pipeline.efficiency, "test").unwrap()[id as usize].len(), 1);
        }
    }

    #[test]
    fn test_commit_rejects_unknown_gate_before_applying() {
        let pipeline = GatePipeline::new(&default_gates(), 100, 25);
        let mut pending = pipeline.process_serial(&window(), &quality()).unwrap().pending;
        let mut stray = pending[0];
        stray.gate = GateId(9);
        pending.push(stray);

        assert!(pipeline.commit(&pending).is_err());
        assert_eq!(pipeline.gate(GateId(0)).unwrap().invocations(), 0);
    }

    #[test]
    fn test_parallel_matches_gate_count() {
        let pool = WorkerPool::new(3).unwrap();
        let pipeline = GatePipeline::new(&default_gates(), 100, 25);
        let run = pipeline.process_parallel(&pool, &window(), &quality()).unwrap();
        assert_eq!(run.intermediates.len(), 3);
        assert_eq!(run.output.len(), 250);
        assert!(run.output.iter().all(|y| y.is_finite()));
    }

    #[test]
    fn test_combine_weighted() {
        let outputs = vec![vec![1.0, 1.0], vec![3.0, 3.0]];
        let metric = |e: f64| GateMetrics {
            gate: GateId(0),
            kind: GateKind::NoiseReduction,
            efficiency: e,
            elapsed_us: 0.0,
            effective: GateKind::NoiseReduction.default_coefficients(),
            fell_back: false,
        };
        let mut out = Vec::new();
        combine_weighted(&outputs, &[metric(0.0), metric(0.0)], &[0.0, 0.0], &mut out);
        assert_eq!(out, vec![2.0, 2.0]);
        combine_weighted(&outputs, &[metric(0.75), metric(0.25)], &[0.0, 0.0], &mut out);
        assert_eq!(out, vec![1.5, 1.5]);
        combine_weighted(&[], &[], &[4.0], &mut out);
        assert_eq!(out, vec![4.0]);
    }

    #[test]
    fn test_reorder_by_efficiency_with_stable_ties() {
        let pipeline = GatePipeline::new(&default_gates(), 10, 25);
        pipeline.record_efficiency(GateId(0), 0.2).unwrap();
        pipeline.record_efficiency(GateId(1), 0.9).unwrap();
        pipeline.record_efficiency(GateId(2), 0.2).unwrap();

        let order = pipeline.reorder().unwrap();
        assert_eq!(order.gates, vec![GateId(1), GateId(0), GateId(2)]);
        assert_eq!(order.version, 1);

        // Unchanged order does not bump the version
        assert_eq!(pipeline.reorder().unwrap().version, 1);
    }

    #[test]
    fn test_on_tick_reorders_on_interval() {
        let pipeline = GatePipeline::new(&default_gates(), 10, 3);
        pipeline.record_efficiency(GateId(2), 1.0).unwrap();
        assert!(!pipeline.on_tick().unwrap());
        assert!(!pipeline.on_tick().unwrap());
        assert!(pipeline.on_tick().unwrap());
        assert_eq!(pipeline.order().gates[0], GateId(2));
    }

    #[test]
    fn test_restore_order_validates() {
        let pipeline = GatePipeline::new(&default_gates(), 10, 3);
        assert!(pipeline.restore_order(vec![GateId(2), GateId(1), GateId(0)]).is_ok());
        assert!(pipeline.restore_order(vec![GateId(2)]).is_err());
        assert_eq!(pipeline.order().gates[0], GateId(2));
    }
}
