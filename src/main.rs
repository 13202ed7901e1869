//! Venturi engine - Main Entry Point
//!
//! Drives the engine over a synthetic multi-channel stream and prints each
//! tick's result as a JSON line.
//!
//! ```text
//! venturi [CONFIG] [TICKS]
//! ```
//!
//! Set `VENTURI_LOG_DIR` to also write a daily rolling log file.

use anyhow::Context;
use std::f64::consts::PI;
use std::io::Write;
use venturi_rs::{EngineConfig, SignalEngine, TickMetadata};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_TICKS: u64 = 100;

fn main() -> anyhow::Result<()> {
    // Keep the appender guard alive until exit so buffered lines are flushed.
    let _guard = init_logging();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => EngineConfig::with_channels(2),
    };
    let ticks = match args.next() {
        Some(n) => n.parse().with_context(|| format!("Invalid tick count: {}", n))?,
        None => DEFAULT_TICKS,
    };

    tracing::info!("Starting Venturi engine for {} ticks", ticks);

    let channels = config.channels;
    let block_len = config.window_len;
    let rate = config.sampling_rate;
    let save_snapshot = config.snapshot_path.is_some();
    let mut engine = SignalEngine::new(config).context("Failed to start engine")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for tick in 0..ticks {
        let raw = synthetic_block(channels, block_len, rate, tick);
        let meta = TickMetadata {
            channel_names: None,
            context: Some(format!("synthetic-{}", tick)),
        };
        match engine.process(&raw, &meta) {
            Ok(result) => {
                serde_json::to_writer(&mut out, &result)?;
                writeln!(out)?;
            }
            Err(e) => {
                tracing::warn!("Tick {} failed: {}", tick, e);
            }
        }
    }

    if save_snapshot {
        let path = engine.save_snapshot(None)?;
        tracing::info!("Snapshot written to {:?}", path);
    }

    tracing::info!("Shutting down...");
    engine.shutdown();
    Ok(())
}

fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,venturi_rs=debug"));
    // Results go to stdout; logs go to stderr.
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match std::env::var_os("VENTURI_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "venturi.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

/// Deterministic test signal: 10 Hz and 20 Hz components, a 110 Hz
/// interference tone and slow drift, phase-shifted per channel.
fn synthetic_block(channels: usize, len: usize, rate: f64, tick: u64) -> Vec<Vec<f64>> {
    let offset = tick as usize * len;
    (0..channels)
        .map(|c| {
            let phase = c as f64 * 0.7;
            (0..len)
                .map(|i| {
                    let t = (offset + i) as f64 / rate;
                    (2.0 * PI * 10.0 * t + phase).sin()
                        + 0.5 * (2.0 * PI * 20.0 * t).sin()
                        + 0.3 * (2.0 * PI * 110.0 * t + phase).sin()
                        + 0.2 * (2.0 * PI * 0.1 * t).sin()
                })
                .collect()
        })
        .collect()
}
