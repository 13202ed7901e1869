//! Test to verify test infrastructure works correctly

mod common;

use common::builders::EngineConfigBuilder;
use common::mock_helpers::StepClock;
use common::NoiseSource;
use std::time::Duration;
use venturi_rs::buffer::Clock;

#[test]
fn test_infrastructure_setup() {
    // Test that builders work
    let config = EngineConfigBuilder::new().channels(2).window_len(64).build();

    assert_eq!(config.channels, 2);
    assert_eq!(config.window_len, 64);
    assert!(config.validate().is_ok());
}

#[test]
fn test_step_clock_advances() {
    let clock = StepClock::new(Duration::from_millis(2));
    let a = clock.now();
    let b = clock.now();
    assert_eq!(b - a, Duration::from_millis(2));
}

#[test]
fn test_noise_is_seeded() {
    let mut a = NoiseSource::new(9);
    let mut b = NoiseSource::new(9);
    for _ in 0..16 {
        assert_eq!(a.gaussian(1.0), b.gaussian(1.0));
    }
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
