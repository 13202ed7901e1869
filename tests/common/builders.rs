//! Test data builders for creating test objects

use venturi_rs::{EngineConfig, GateConfig, ProcessingMode};

/// Builder for engine configurations used across integration tests
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig {
                window_len: 250,
                buffer_capacity: 500,
                // Debug builds are slow; tests opt in to tight budgets.
                latency_budget_ms: 10_000.0,
                ..EngineConfig::default()
            },
        }
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.config.channels = channels;
        self
    }

    pub fn window_len(mut self, len: usize) -> Self {
        self.config.window_len = len;
        self.config.buffer_capacity = self.config.buffer_capacity.max(len);
        self
    }

    pub fn latency_budget_ms(mut self, ms: f64) -> Self {
        self.config.latency_budget_ms = ms;
        self
    }

    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.config.memory_capacity = capacity;
        self
    }

    pub fn reorder_interval(mut self, interval: u64) -> Self {
        self.config.reorder_interval = interval;
        self
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn gates(mut self, gates: Vec<GateConfig>) -> Self {
        self.config.gates = gates;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfigBuilder::new()
            .channels(3)
            .window_len(1000)
            .memory_capacity(7)
            .build();

        assert_eq!(config.channels, 3);
        assert_eq!(config.window_len, 1000);
        assert!(config.buffer_capacity >= 1000);
        assert_eq!(config.memory_capacity, 7);
        assert!(config.validate().is_ok());
    }
}
