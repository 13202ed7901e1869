//! Signal engine: the per-tick driver.
//!
//! A [`SignalEngine`] owns every component and implements the inbound
//! `process` contract. Each tick:
//! 1. Push raw samples into the ring buffers and copy out one window per channel.
//! 2. Assess input quality per channel (fanned out on the worker pool).
//! 3. Run every channel through the shared gate pipeline.
//! 4. Assess output quality per channel.
//! 5. Commit pending gate updates and record the experience.
//! 6. Reorder the pipeline when the interval elapses.
//! 7. Time the tick against the latency budget.
//!
//! Shutdown is checked between phases. A cancelled tick returns
//! [`EngineError::Cancelled`] before anything is committed: gate state,
//! coefficients and counters, the pipeline order and the experience memory
//! are untouched. The samples it delivered stay in the ring buffers, so the
//! next tick's windows include them. Any other failure inside a tick yields a
//! degraded result (input passed through, zero quality, previous adaptation
//! score).

use crate::analysis::SignalQualityAssessor;
use crate::backend::WorkerPool;
use crate::buffer::{Clock, LatencyMonitor, RealTimeBufferManager, SystemClock};
use crate::config::{EngineConfig, ProcessingMode};
use crate::error::{EngineError, Result, ResultExt};
use crate::learning::AdaptiveLearningCore;
use crate::pipeline::{lock, GatePipeline, PipelineOrder, PipelineRun};
use crate::session::{EngineSnapshot, GateSnapshot, SNAPSHOT_VERSION};
use crate::types::{
    GateId, ProcessingResult, QualityMetrics, SignalSummary, TickMetadata,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared shutdown flag
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to stop; the current tick is abandoned
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_requested() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-channel scratch reused across ticks
struct ChannelSlot {
    window: Vec<f64>,
    assessor: SignalQualityAssessor,
    quality: QualityMetrics,
    output_quality: QualityMetrics,
    run: PipelineRun,
}

pub struct SignalEngine {
    config: EngineConfig,
    buffers: RealTimeBufferManager,
    pipeline: GatePipeline,
    learning: AdaptiveLearningCore,
    pool: WorkerPool,
    slots: Vec<Arc<Mutex<ChannelSlot>>>,
    latency: LatencyMonitor,
    shutdown: ShutdownSignal,
    clock: Arc<dyn Clock>,
    tick: u64,
    degraded_ticks: u64,
}

impl SignalEngine {
    /// Build an engine on the system clock
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build an engine with a custom time source
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let pool = WorkerPool::new(config.worker_count())?;
        let slots = (0..config.channels)
            .map(|_| {
                Arc::new(Mutex::new(ChannelSlot {
                    window: Vec::with_capacity(config.window_len),
                    assessor: SignalQualityAssessor::new(config.quality.clone()),
                    quality: QualityMetrics::zero(),
                    output_quality: QualityMetrics::zero(),
                    run: PipelineRun::new(),
                }))
            })
            .collect();

        tracing::info!(
            channels = config.channels,
            gates = config.gates.len(),
            workers = pool.size(),
            mode = %config.mode,
            "Signal engine started"
        );

        Ok(Self {
            buffers: RealTimeBufferManager::new(
                config.channels,
                config.buffer_capacity,
                config.window_len,
            ),
            pipeline: GatePipeline::new(
                &config.gates,
                config.efficiency_history,
                config.reorder_interval,
            ),
            learning: AdaptiveLearningCore::new(config.adaptation.clone(), config.memory_capacity),
            latency: LatencyMonitor::new(config.latency_budget(), config.max_consecutive_overruns),
            pool,
            slots,
            shutdown: ShutdownSignal::new(),
            clock,
            tick: 0,
            degraded_ticks: 0,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &GatePipeline {
        &self.pipeline
    }

    pub fn learning(&self) -> &AdaptiveLearningCore {
        &self.learning
    }

    pub fn buffers(&self) -> &RealTimeBufferManager {
        &self.buffers
    }

    /// Ticks completed (including degraded ones)
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn degraded_ticks(&self) -> u64 {
        self.degraded_ticks
    }

    /// Handle for requesting shutdown from another thread
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Process one `[channels][samples]` block.
    ///
    /// Returns `Cancelled` if shutdown was requested and
    /// `BackpressureExceeded` when the consecutive overrun limit is hit.
    pub fn process(&mut self, raw: &[Vec<f64>], meta: &TickMetadata) -> Result<ProcessingResult> {
        self.shutdown.check()?;
        let started = self.clock.now();

        let mut result = match self.run_tick(raw, meta) {
            Ok(result) => result,
            Err(e) if e.is_caller_facing() => {
                tracing::info!("Tick {} abandoned: {}", self.tick + 1, e);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("Tick {} degraded: {}", self.tick + 1, e);
                self.degraded_ticks += 1;
                self.degraded_result(raw, meta)
            }
        };
        self.tick += 1;
        result.tick = self.tick;

        let elapsed = self.clock.now().saturating_duration_since(started);
        result.processing_latency_ms = elapsed.as_secs_f64() * 1000.0;
        let status = self
            .latency
            .record(elapsed)
            .with_context(|| format!("tick {}", self.tick))?;
        result.latency_overrun = status.overrun;

        tracing::debug!(
            tick = self.tick,
            latency_ms = result.processing_latency_ms,
            score = result.adaptation_score,
            degraded = result.degraded,
            "tick complete"
        );
        Ok(result)
    }

    fn run_tick(&mut self, raw: &[Vec<f64>], meta: &TickMetadata) -> Result<ProcessingResult> {
        self.buffers.push_window(raw)?;
        for (c, slot) in self.slots.iter().enumerate() {
            let mut slot = lock(slot.as_ref(), "channel slot")?;
            self.buffers.window(c)?.copy_into(&mut slot.window);
        }

        let rate = self.config.sampling_rate;
        self.for_each_slot(move |s| s.quality = s.assessor.assess(&s.window, rate))?;
        self.shutdown.check()?;

        for slot in &self.slots {
            let mut guard = lock(slot.as_ref(), "channel slot")?;
            let s = &mut *guard;
            match self.config.mode {
                ProcessingMode::Serial => {
                    self.pipeline
                        .process_serial_into(&s.window, &s.quality, &mut s.run)?;
                }
                ProcessingMode::Parallel => {
                    s.run = self
                        .pipeline
                        .process_parallel(&self.pool, &s.window, &s.quality)?;
                }
            }
        }

        self.for_each_slot(move |s| s.output_quality = s.assessor.assess(&s.run.output, rate))?;
        self.shutdown.check()?;

        // Commit phase: nothing below is cancellable.
        let channels = self.slots.len();
        let mut pending = Vec::new();
        let mut enhanced = Vec::with_capacity(channels);
        let mut channel_quality = Vec::with_capacity(channels);
        let mut output_quality = Vec::with_capacity(channels);
        let mut input_summaries = Vec::with_capacity(channels);
        let mut output_summaries = Vec::with_capacity(channels);
        let mut efficiency = 0.0;
        let mut order: Vec<GateId> = Vec::new();

        for slot in &self.slots {
            let s = lock(slot.as_ref(), "channel slot")?;
            pending.extend_from_slice(&s.run.pending);
            enhanced.push(s.run.output.clone());
            channel_quality.push(s.quality);
            output_quality.push(s.output_quality);
            input_summaries.push(SignalSummary::of(&s.window));
            output_summaries.push(SignalSummary::of(&s.run.output));
            efficiency += s.run.mean_efficiency();
            if order.is_empty() {
                order = s.run.order.gates.clone();
            }
        }
        let efficiency = efficiency / channels.max(1) as f64;

        self.pipeline.commit(&pending)?;

        let quality = QualityMetrics::mean_of(&channel_quality);
        let output = QualityMetrics::mean_of(&output_quality);
        let observation = self.learning.observe(
            SignalSummary::mean_of(&input_summaries),
            SignalSummary::mean_of(&output_summaries),
            quality.overall,
            output.overall,
            efficiency,
        );

        if self.pipeline.on_tick()? {
            tracing::debug!(order = ?self.pipeline.order().gates, "reorder interval reached");
        }

        Ok(ProcessingResult {
            tick: 0,
            channel_names: self.channel_names(meta, channels),
            enhanced_signal: enhanced,
            quality,
            channel_quality,
            gate_states: self.pipeline.gate_states()?,
            order,
            adaptation_score: observation.adaptation_score,
            processing_latency_ms: 0.0,
            latency_overrun: false,
            degraded: false,
            context: meta.context.clone(),
        })
    }

    /// Run `f` on every channel slot, on the pool when there is more than one
    /// channel and more than one worker.
    fn for_each_slot<F>(&self, f: F) -> Result<()>
    where
        F: Fn(&mut ChannelSlot) + Send + Sync + 'static,
    {
        if self.slots.len() <= 1 || self.pool.size() <= 1 {
            for slot in &self.slots {
                f(&mut *lock(slot.as_ref(), "channel slot")?);
            }
            return Ok(());
        }

        self.pool
            .map(self.slots.clone(), move |slot: Arc<Mutex<ChannelSlot>>| {
                let mut guard = lock(slot.as_ref(), "channel slot")?;
                f(&mut *guard);
                Ok(())
            })?
            .into_iter()
            .collect()
    }

    fn degraded_result(&self, raw: &[Vec<f64>], meta: &TickMetadata) -> ProcessingResult {
        let enhanced: Vec<Vec<f64>> = raw
            .iter()
            .map(|ch| ch.iter().map(|&x| if x.is_finite() { x } else { 0.0 }).collect())
            .collect();
        ProcessingResult {
            tick: 0,
            channel_names: self.channel_names(meta, raw.len()),
            channel_quality: vec![QualityMetrics::zero(); raw.len()],
            enhanced_signal: enhanced,
            quality: QualityMetrics::zero(),
            gate_states: self.pipeline.gate_states().unwrap_or_default(),
            order: self.pipeline.order().gates.clone(),
            adaptation_score: self.learning.adaptation_score(),
            processing_latency_ms: 0.0,
            latency_overrun: false,
            degraded: true,
            context: meta.context.clone(),
        }
    }

    fn channel_names(&self, meta: &TickMetadata, channels: usize) -> Vec<String> {
        match &meta.channel_names {
            Some(names) if names.len() == channels => names.clone(),
            _ => (0..channels).map(|i| self.config.channel_name(i)).collect(),
        }
    }

    // ==================== Snapshots ====================

    /// Capture gate states, order and experience memory
    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        let mut gates = Vec::with_capacity(self.pipeline.len());
        for i in 0..self.pipeline.len() {
            let gate = self.pipeline.gate(GateId(i as u32))?;
            gates.push(GateSnapshot {
                id: gate.id(),
                kind: gate.kind(),
                name: gate.name().to_string(),
                state: *gate.state(),
                coefficients: *gate.coefficients(),
            });
        }

        Ok(EngineSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now(),
            tick: self.tick,
            gates,
            order: self.pipeline.order().gates.clone(),
            experiences: self.learning.memory().snapshot(),
            memory_capacity: self.learning.memory().capacity(),
            adaptation_score: self.learning.adaptation_score(),
        })
    }

    /// Restore a snapshot. Nothing is applied unless the whole snapshot
    /// matches this engine's gate layout: every gate id `0..n` exactly once,
    /// with matching kinds. Restored state is clamped into the gate's bounds.
    pub fn restore(&mut self, snapshot: EngineSnapshot) -> Result<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let ids: Vec<GateId> = snapshot.gates.iter().map(|g| g.id).collect();
        if !PipelineOrder::is_permutation_of(&ids, self.pipeline.len()) {
            return Err(EngineError::Snapshot(format!(
                "snapshot gates {:?} do not cover gates 0..{} exactly once",
                ids,
                self.pipeline.len()
            )));
        }
        for g in &snapshot.gates {
            let kind = self
                .config
                .gates
                .get(g.id.index())
                .map(|c| c.kind)
                .ok_or_else(|| EngineError::Snapshot(format!("unknown gate {}", g.id)))?;
            if kind != g.kind {
                return Err(EngineError::Snapshot(format!(
                    "gate {} is {} in the snapshot but {} in this engine",
                    g.id, g.kind, kind
                )));
            }
        }
        if !PipelineOrder::is_permutation_of(&snapshot.order, self.pipeline.len()) {
            return Err(EngineError::Snapshot(format!(
                "order {:?} does not match {} gates",
                snapshot.order,
                self.pipeline.len()
            )));
        }

        for g in &snapshot.gates {
            self.pipeline.restore_gate(g.id, g.state, g.coefficients)?;
        }
        self.pipeline.restore_order(snapshot.order)?;
        self.learning
            .restore(snapshot.experiences, snapshot.adaptation_score);
        self.tick = snapshot.tick;

        tracing::info!(tick = self.tick, "Restored engine snapshot");
        Ok(())
    }

    /// Save a snapshot to `path`, the configured path or the data directory
    pub fn save_snapshot(&self, path: Option<&Path>) -> Result<std::path::PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.config.snapshot_path.clone())
            .or_else(crate::config::default_snapshot_path)
            .ok_or_else(|| EngineError::Snapshot("no snapshot path available".into()))?;
        self.snapshot()?.save(&path).context("saving snapshot")?;
        Ok(path)
    }

    /// Load and restore a snapshot file
    pub fn load_snapshot(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = EngineSnapshot::load(path.as_ref()).context("loading snapshot")?;
        self.restore(snapshot)
    }

    /// Stop the engine and join its workers
    pub fn shutdown(self) {
        self.shutdown.request();
        tracing::info!(
            ticks = self.tick,
            degraded = self.degraded_ticks,
            "Signal engine stopped"
        );
    }
}

impl std::fmt::Debug for SignalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEngine")
            .field("channels", &self.config.channels)
            .field("tick", &self.tick)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
