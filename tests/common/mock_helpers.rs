//! Mock construction helpers

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use venturi_rs::buffer::Clock;

/// Clock that advances by a fixed step on every reading
pub struct StepClock {
    base: Instant,
    step: Duration,
    calls: AtomicU32,
}

impl StepClock {
    pub fn new(step: Duration) -> Self {
        Self {
            base: Instant::now(),
            step,
            calls: AtomicU32::new(0),
        }
    }

    pub fn shared(step: Duration) -> Arc<dyn Clock> {
        Arc::new(Self::new(step))
    }
}

impl Clock for StepClock {
    fn now(&self) -> Instant {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.base + self.step * n
    }
}
