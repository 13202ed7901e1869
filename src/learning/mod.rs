//! Online learning
//!
//! [`AdaptiveLearningCore`] turns each tick into an [`Experience`], stores it
//! in a bounded [`ExperienceMemory`] and reports the adaptation score:
//!
//! ```text
//! performance = w_out·q_out + w_gain·(0.5 + 0.5·(q_out − q_in)) + w_eff·efficiency
//! score       = w_pipeline·efficiency + w_history·mean(last W performances)
//! ```
//!
//! Learning is strictly online. Gate coefficients are tuned by each gate's own
//! controller; the core only scores and remembers.

pub mod memory;

pub use memory::{Experience, ExperienceMemory};

use crate::config::AdaptationConfig;
use crate::types::{RollingWindow, SignalSummary};

/// What the core produced for one tick
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub performance_metric: f64,
    pub adaptation_score: f64,
    pub evicted: Option<Experience>,
}

#[derive(Debug, Clone)]
pub struct AdaptiveLearningCore {
    config: AdaptationConfig,
    memory: ExperienceMemory,
    recent: RollingWindow,
    last_score: f64,
}

impl AdaptiveLearningCore {
    pub fn new(config: AdaptationConfig, capacity: usize) -> Self {
        let recent = RollingWindow::new(config.recent_window);
        Self {
            config,
            memory: ExperienceMemory::new(capacity),
            recent,
            last_score: 0.0,
        }
    }

    pub fn memory(&self) -> &ExperienceMemory {
        &self.memory
    }

    /// Score of the last observed tick
    pub fn adaptation_score(&self) -> f64 {
        self.last_score
    }

    /// Mean performance of the last `W` experiences
    pub fn recent_performance(&self) -> f64 {
        self.recent.mean()
    }

    pub fn performance_metric(
        &self,
        input_overall: f64,
        output_overall: f64,
        pipeline_efficiency: f64,
    ) -> f64 {
        let c = &self.config;
        let improvement = 0.5 + 0.5 * (output_overall - input_overall);
        let perf = c.output_quality_weight * output_overall
            + c.improvement_weight * improvement
            + c.efficiency_weight * pipeline_efficiency;
        if perf.is_finite() {
            perf.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Record one tick and update the adaptation score
    pub fn observe(
        &mut self,
        input_summary: SignalSummary,
        output_summary: SignalSummary,
        input_overall: f64,
        output_overall: f64,
        pipeline_efficiency: f64,
    ) -> Observation {
        let performance_metric =
            self.performance_metric(input_overall, output_overall, pipeline_efficiency);
        let evicted = self.memory.adapt(Experience::new(
            input_summary,
            output_summary,
            performance_metric,
        ));
        self.recent.push(performance_metric);

        let efficiency = if pipeline_efficiency.is_finite() {
            pipeline_efficiency.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let score = (self.config.pipeline_weight * efficiency
            + self.config.history_weight * self.recent.mean())
        .clamp(0.0, 1.0);
        self.last_score = score;

        tracing::trace!(performance_metric, score, "experience recorded");
        Observation {
            performance_metric,
            adaptation_score: score,
            evicted,
        }
    }

    /// Restore memory contents and the last score from a snapshot
    pub fn restore(&mut self, experiences: Vec<Experience>, adaptation_score: f64) {
        self.recent.clear();
        let skip = experiences.len().saturating_sub(self.recent.capacity());
        let mut ordered: Vec<&Experience> = experiences.iter().collect();
        ordered.sort_by_key(|e| e.sequence);
        for e in ordered.into_iter().skip(skip) {
            self.recent.push(e.performance_metric);
        }
        self.memory.restore(experiences);
        self.last_score = adaptation_score.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_metric_weights() {
        let core = AdaptiveLearningCore::new(AdaptationConfig::default(), 10);
        // 0.5·0.8 + 0.3·(0.5 + 0.5·0.2) + 0.2·1.0
        let perf = core.performance_metric(0.6, 0.8, 1.0);
        assert!((perf - 0.78).abs() < 1e-12);
        assert_eq!(core.performance_metric(f64::NAN, 0.5, 0.5), 0.0);
    }

    #[test]
    fn test_score_blends_efficiency_and_history() {
        let mut core = AdaptiveLearningCore::new(AdaptationConfig::default(), 10);
        let s = SignalSummary::default();
        let obs = core.observe(s, s, 0.5, 0.5, 1.0);
        // perf = 0.25 + 0.15 + 0.2 = 0.6, score = 0.6·1 + 0.4·0.6
        assert!((obs.performance_metric - 0.6).abs() < 1e-12);
        assert!((obs.adaptation_score - 0.84).abs() < 1e-12);
        assert_eq!(core.adaptation_score(), obs.adaptation_score);
    }

    #[test]
    fn test_recent_window_survives_eviction() {
        let config = AdaptationConfig {
            recent_window: 4,
            ..Default::default()
        };
        let mut core = AdaptiveLearningCore::new(config, 2);
        let s = SignalSummary::default();
        for _ in 0..4 {
            core.observe(s, s, 0.0, 0.0, 0.0);
        }
        assert_eq!(core.memory().len(), 2);
        assert!((core.recent_performance() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_restore_rebuilds_recent_window() {
        let mut core = AdaptiveLearningCore::new(AdaptationConfig::default(), 10);
        let s = SignalSummary::default();
        core.observe(s, s, 0.0, 1.0, 1.0);
        core.observe(s, s, 0.0, 0.0, 0.0);
        let snapshot = core.memory().snapshot();

        let mut fresh = AdaptiveLearningCore::new(AdaptationConfig::default(), 10);
        fresh.restore(snapshot, 0.42);
        assert_eq!(fresh.memory().len(), 2);
        assert_eq!(fresh.adaptation_score(), 0.42);
        assert!((fresh.recent_performance() - core.recent_performance()).abs() < 1e-12);
    }
}
