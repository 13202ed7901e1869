//! Latency budget tracking and backpressure
//!
//! Every tick is timed against the configured budget. A tick over budget is
//! an overrun; `max_consecutive` overruns in a row raise
//! [`EngineError::BackpressureExceeded`] on exactly that tick, after which the
//! counter starts again from zero. Any tick within budget also resets it.

use crate::error::{EngineError, Result};
use std::time::{Duration, Instant};

/// Source of monotonic time for tick measurement
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Outcome of timing one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStatus {
    pub elapsed: Duration,
    pub overrun: bool,
    /// Consecutive overruns including this tick
    pub consecutive: u32,
}

impl LatencyStatus {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone)]
pub struct LatencyMonitor {
    budget: Duration,
    max_consecutive: u32,
    consecutive: u32,
    total_overruns: u64,
}

impl LatencyMonitor {
    pub fn new(budget: Duration, max_consecutive: u32) -> Self {
        Self {
            budget,
            max_consecutive: max_consecutive.max(1),
            consecutive: 0,
            total_overruns: 0,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn total_overruns(&self) -> u64 {
        self.total_overruns
    }

    /// Record one tick's duration
    pub fn record(&mut self, elapsed: Duration) -> Result<LatencyStatus> {
        if elapsed <= self.budget {
            self.consecutive = 0;
            return Ok(LatencyStatus {
                elapsed,
                overrun: false,
                consecutive: 0,
            });
        }

        self.consecutive += 1;
        self.total_overruns += 1;
        tracing::warn!(
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            budget_ms = self.budget.as_secs_f64() * 1000.0,
            consecutive = self.consecutive,
            "tick over latency budget"
        );

        if self.consecutive >= self.max_consecutive {
            let consecutive = self.consecutive;
            self.consecutive = 0;
            return Err(EngineError::BackpressureExceeded {
                consecutive,
                budget: self.budget,
            });
        }

        Ok(LatencyStatus {
            elapsed,
            overrun: true,
            consecutive: self.consecutive,
        })
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backpressure_on_third_overrun() {
        let mut m = LatencyMonitor::new(Duration::from_millis(1), 3);
        let over = Duration::from_millis(2);
        assert!(m.record(over).unwrap().overrun);
        assert_eq!(m.record(over).unwrap().consecutive, 2);
        let err = m.record(over).unwrap_err();
        assert!(matches!(
            err,
            EngineError::BackpressureExceeded { consecutive: 3, .. }
        ));
        // Counter restarts after firing
        assert_eq!(m.consecutive(), 0);
        assert_eq!(m.record(over).unwrap().consecutive, 1);
        assert_eq!(m.total_overruns(), 4);
    }

    #[test]
    fn test_in_budget_tick_resets_counter() {
        let mut m = LatencyMonitor::new(Duration::from_millis(1), 3);
        let over = Duration::from_millis(2);
        m.record(over).unwrap();
        m.record(over).unwrap();
        let ok = m.record(Duration::from_micros(500)).unwrap();
        assert!(!ok.overrun);
        m.record(over).unwrap();
        assert!(m.record(over).is_ok());
    }

    #[test]
    fn test_mock_clock_measures_elapsed() {
        let base = Instant::now();
        let mut clock = MockClock::new();
        let mut seq = mockall::Sequence::new();
        clock
            .expect_now()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(base);
        clock
            .expect_now()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(base + Duration::from_millis(2));

        let start = clock.now();
        let elapsed = clock.now() - start;
        let mut m = LatencyMonitor::new(Duration::from_millis(1), 3);
        assert!(m.record(elapsed).unwrap().overrun);
    }
}
