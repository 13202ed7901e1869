//! Analysis module for signal processing
//!
//! This module provides signal analysis tools including:
//! - FFT power spectra, band power and spectral peak retention
//! - Per-window signal quality assessment

pub mod fft;
pub mod quality;

pub use fft::{FftAnalyzer, FftConfig, PowerSpectrum, WindowFunction};
pub use quality::{assess, SignalQualityAssessor, CANONICAL_BANDS};
