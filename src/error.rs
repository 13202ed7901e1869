//! Error handling for the Venturi engine
//!
//! This module defines the engine error type and a Result alias for use
//! throughout the crate. Most per-tick failures are recovered locally; only
//! backpressure, cancellation and configuration problems reach the caller.

use std::time::Duration;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Window was empty, constant or otherwise unusable for assessment
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// A gate produced NaN/Inf samples (recovered via input fallback)
    #[error("Gate {gate} produced non-finite output")]
    NonFiniteOutput { gate: String },

    /// Consecutive latency-budget overruns reached the configured limit
    #[error("Backpressure exceeded: {consecutive} consecutive ticks over the {budget:?} budget")]
    BackpressureExceeded { consecutive: u32, budget: Duration },

    /// Experience memory grew past its capacity after eviction
    #[error("Capacity invariant violated: {len} entries with capacity {capacity}")]
    CapacityInvariantViolation { len: usize, capacity: usize },

    /// Raw window does not match the configured channel layout
    #[error("Channel mismatch: expected {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// Tick abandoned because shutdown was requested
    #[error("Tick cancelled by shutdown")]
    Cancelled,

    /// Worker pool failure (job panicked or pool shut down)
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// A shared lock was poisoned by a panicking holder
    #[error("Lock poisoned: {0}")]
    Poisoned(String),

    /// Errors related to configuration loading/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to warm-restart snapshots
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the caller has to act on this error.
    ///
    /// Everything else is folded into a degraded tick by the engine.
    pub fn is_caller_facing(&self) -> bool {
        match self {
            EngineError::BackpressureExceeded { .. } | EngineError::Cancelled => true,
            EngineError::WithContext { source, .. } => source.is_caller_facing(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ChannelMismatch {
            expected: 4,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Channel mismatch: expected 4 channels, got 2"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = EngineError::Config("sampling_rate must be positive".to_string());
        let with_ctx = err.with_context("Failed to load engine.toml");
        assert!(with_ctx.to_string().contains("Failed to load engine.toml"));
    }

    #[test]
    fn test_caller_facing_through_context() {
        let err = EngineError::BackpressureExceeded {
            consecutive: 3,
            budget: Duration::from_millis(1),
        }
        .with_context("tick 42");
        assert!(err.is_caller_facing());
        assert!(!EngineError::WorkerPool("boom".into()).is_caller_facing());
    }
}
