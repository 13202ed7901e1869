//! Integration tests for signal quality through the full engine
//!
//! These tests validate:
//! - Pipeline output quality against input quality on noisy sines
//! - Degenerate windows scoring zero without failing the tick
//! - Multi-channel output shape and channel naming

mod common;

use common::builders::EngineConfigBuilder;
use common::{assert_float_eq, sine, NoiseSource};
use venturi_rs::analysis::SignalQualityAssessor;
use venturi_rs::config::QualityConfig;
use venturi_rs::{ProcessingMode, QualityMetrics, SignalEngine, TickMetadata};

const RATE: f64 = 250.0;

#[test]
fn test_pipeline_improves_mean_snr_of_noisy_sine() {
    let config = EngineConfigBuilder::new().window_len(250).build();
    let mut engine = SignalEngine::new(config).unwrap();
    let mut assessor = SignalQualityAssessor::new(QualityConfig::default());
    let mut noise = NoiseSource::new(0x5eed);
    let clean = sine(10.0, RATE, 250);

    let runs = 100;
    let mut input_snr = 0.0;
    let mut output_snr = 0.0;
    for _ in 0..runs {
        let block = noise.corrupt(&clean, 0.3);
        let result = engine
            .process(&[block], &TickMetadata::default())
            .unwrap();
        assert!(!result.degraded);

        input_snr += result.quality.snr;
        output_snr += assessor.assess(&result.enhanced_signal[0], RATE).snr;
    }
    input_snr /= runs as f64;
    output_snr /= runs as f64;

    assert!(
        output_snr >= input_snr,
        "mean output snr {} below mean input snr {}",
        output_snr,
        input_snr
    );
}

#[test]
fn test_all_zero_window_scores_zero() {
    let config = EngineConfigBuilder::new().channels(2).window_len(250).build();
    let mut engine = SignalEngine::new(config).unwrap();

    let result = engine
        .process(&[vec![0.0; 250], vec![0.0; 250]], &TickMetadata::default())
        .unwrap();

    assert_eq!(result.quality.overall, 0.0);
    assert_eq!(result.quality, QualityMetrics::zero());
    for channel in &result.enhanced_signal {
        assert_eq!(channel.len(), 250);
        assert!(channel.iter().all(|x| x.is_finite()));
    }
    assert!((0.0..=1.0).contains(&result.adaptation_score));
}

#[test]
fn test_multi_channel_shapes_and_names() {
    let config = EngineConfigBuilder::new()
        .channels(3)
        .window_len(128)
        .mode(ProcessingMode::Parallel)
        .build();
    let mut engine = SignalEngine::new(config).unwrap();
    let mut noise = NoiseSource::new(7);

    let raw: Vec<Vec<f64>> = [8.0, 12.0, 20.0]
        .iter()
        .map(|&f| noise.corrupt(&sine(f, RATE, 128), 0.1))
        .collect();
    let meta = TickMetadata {
        channel_names: Some(vec!["Fz".into(), "Cz".into(), "Pz".into()]),
        context: Some("session-a".into()),
    };

    let result = engine.process(&raw, &meta).unwrap();
    assert_eq!(result.tick, 1);
    assert_eq!(result.channel_names, vec!["Fz", "Cz", "Pz"]);
    assert_eq!(result.enhanced_signal.len(), 3);
    assert_eq!(result.channel_quality.len(), 3);
    assert_eq!(result.context.as_deref(), Some("session-a"));
    assert!(result
        .enhanced_signal
        .iter()
        .all(|c| c.len() == 128 && c.iter().all(|x| x.is_finite())));

    let mean_overall =
        result.channel_quality.iter().map(|q| q.overall).sum::<f64>() / 3.0;
    assert_float_eq(result.quality.overall, mean_overall, 1e-12);
}

#[test]
fn test_non_finite_samples_are_sanitized() {
    let config = EngineConfigBuilder::new().window_len(64).build();
    let mut engine = SignalEngine::new(config).unwrap();

    let mut block = sine(10.0, RATE, 64);
    block[3] = f64::NAN;
    block[40] = f64::INFINITY;

    let result = engine.process(&[block], &TickMetadata::default()).unwrap();
    assert!(result.enhanced_signal[0].iter().all(|x| x.is_finite()));
    assert_eq!(engine.buffers().sanitized(), 2);
}
