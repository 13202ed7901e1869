//! Execution backend
//!
//! Threads that do work on behalf of the engine. The engine owns a single
//! [`WorkerPool`] sized from [`EngineConfig::worker_count`]
//! (`min(8, channels)` by default) and shares it with the gate pipeline.
//!
//! [`EngineConfig::worker_count`]: crate::config::EngineConfig::worker_count

pub mod worker;

pub use worker::WorkerPool;
