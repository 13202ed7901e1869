//! # Venturi-RS: Adaptive Real-Time Signal Enhancement
//!
//! A multi-channel signal-enhancement engine built from a cascade of
//! self-tuning filter stages ("Venturi gates"). Each tick cleans and shapes a
//! window of biosignal samples under a strict latency budget, while a
//! bounded-memory learning loop nudges gate coefficients and the pipeline
//! order toward what has worked best.
//!
//! ## Architecture
//!
//! - **Buffer**: per-channel ring buffers and latency-budget tracking
//! - **Analysis**: FFT primitives and per-window quality assessment
//! - **Pipeline**: gates, their coefficient controllers and periodic reordering
//! - **Learning**: experience memory and the adaptation score
//! - **Backend**: worker pool for per-channel and per-gate fan-out
//! - **Session**: versioned warm-restart snapshots
//!
//! ```text
//! raw ─► RealTimeBufferManager ─► SignalQualityAssessor ─► GatePipeline
//!                                                            │
//!          periodic reorder ◄── ExperienceMemory ◄── AdaptiveLearningCore
//! ```
//!
//! ## Configuration
//!
//! Engine settings live in a TOML or JSON file (see [`config::EngineConfig`]).
//! Snapshots default to the platform data directory under `dev.venturi.engine`.
//!
//! ## Example
//!
//! ```ignore
//! use venturi_rs::{EngineConfig, SignalEngine, TickMetadata};
//!
//! let mut engine = SignalEngine::new(EngineConfig::with_channels(2))?;
//! let raw = vec![vec![0.0; 250], vec![0.0; 250]];
//! let result = engine.process(&raw, &TickMetadata::default())?;
//! println!("{}", serde_json::to_string(&result)?);
//! ```

pub mod analysis;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod learning;
pub mod pipeline;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, GateConfig, ProcessingMode};
pub use engine::{ShutdownSignal, SignalEngine};
pub use error::{EngineError, Result};
pub use learning::{AdaptiveLearningCore, Experience, ExperienceMemory};
pub use pipeline::{GatePipeline, PipelineOrder, VenturiGate};
pub use session::EngineSnapshot;
pub use types::{
    GateCoefficients, GateId, GateKind, GateState, ProcessingResult, QualityMetrics,
    TickMetadata,
};
