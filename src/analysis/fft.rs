//! FFT (Fast Fourier Transform) primitives
//!
//! Provides the frequency-domain building blocks used by quality assessment
//! and the pattern-extraction gate:
//! - One-sided power spectra with configurable window functions
//! - Band power integration over `[lo, hi)` Hz
//! - Spectral peak retention (forward FFT, magnitude mask, inverse FFT)
//!
//! Buffers and FFT plans are kept inside the analyzer and reused, so repeated
//! calls on same-length windows do not allocate. Only the planned `Fft`
//! handles are cached, so the analyzer is `Send` and can live in a gate.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Window function type for FFT preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// Rectangular window (no windowing)
    Rectangular,
    /// Hann window (good general purpose)
    #[default]
    Hann,
    /// Hamming window (reduced side lobes)
    Hamming,
    /// Blackman window (very low side lobes)
    Blackman,
}

impl WindowFunction {
    /// Get all window functions
    pub fn all() -> &'static [WindowFunction] {
        &[
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ]
    }

    /// Compute window coefficient at position i out of n samples
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        let n_f = n as f64;
        let i_f = i as f64;

        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * i_f / n_f).cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * i_f / n_f).cos(),
            WindowFunction::Blackman => {
                // Clamp to 0.0: the formula is exactly 0 at endpoints but
                // floating-point representation of 0.42 and 0.08 can produce -ε.
                (0.42 - 0.5 * (2.0 * PI * i_f / n_f).cos() + 0.08 * (4.0 * PI * i_f / n_f).cos())
                    .max(0.0)
            }
        }
    }
}

/// FFT analyzer configuration
#[derive(Debug, Clone)]
pub struct FftConfig {
    /// Window function to use
    pub window: WindowFunction,
    /// Whether to remove the mean before transforming
    pub remove_dc: bool,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            window: WindowFunction::Hann,
            remove_dc: true,
        }
    }
}

impl FftConfig {
    /// Set window function
    pub fn window(mut self, window: WindowFunction) -> Self {
        self.window = window;
        self
    }
}

/// Borrowed view of a one-sided power spectrum
#[derive(Debug, Clone, Copy)]
pub struct PowerSpectrum<'a> {
    /// Power per bin, bins `0..=n/2`
    pub power: &'a [f64],
    /// Frequency resolution (Hz per bin)
    pub resolution: f64,
}

impl<'a> PowerSpectrum<'a> {
    /// Total power excluding the DC bin
    pub fn total(&self) -> f64 {
        self.power.iter().skip(1).sum()
    }

    /// Power in `[lo_hz, hi_hz)`, DC excluded
    pub fn band_power(&self, lo_hz: f64, hi_hz: f64) -> f64 {
        if self.resolution <= 0.0 {
            return 0.0;
        }
        self.power
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(i, _)| {
                let f = *i as f64 * self.resolution;
                f >= lo_hz && f < hi_hz
            })
            .map(|(_, p)| *p)
            .sum()
    }

    /// Frequency of the strongest non-DC bin
    pub fn peak_frequency(&self) -> Option<f64> {
        self.power
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i as f64 * self.resolution)
    }
}

/// Forward and inverse plans for one transform length
struct Plans {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch_len: usize,
}

impl Plans {
    fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            len,
            forward,
            inverse,
            scratch_len,
        }
    }
}

/// FFT analyzer with reusable plans and buffers
pub struct FftAnalyzer {
    plans: Option<Plans>,
    config: FftConfig,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    power: Vec<f64>,
}

impl FftAnalyzer {
    /// Create a new FFT analyzer with default config
    pub fn new() -> Self {
        Self::with_config(FftConfig::default())
    }

    /// Create analyzer with specific config
    pub fn with_config(config: FftConfig) -> Self {
        Self {
            plans: None,
            config,
            buffer: Vec::new(),
            scratch: Vec::new(),
            power: Vec::new(),
        }
    }

    /// Get current config
    pub fn config(&self) -> &FftConfig {
        &self.config
    }

    /// Plan (or reuse plans) for length `n` and size the scratch buffer
    fn prepare(&mut self, n: usize) -> (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>, usize) {
        if self.plans.as_ref().map(|p| p.len) != Some(n) {
            self.plans = Some(Plans::new(n));
        }
        let plans = self.plans.get_or_insert_with(|| Plans::new(n));
        let (forward, inverse, scratch_len) = (
            Arc::clone(&plans.forward),
            Arc::clone(&plans.inverse),
            plans.scratch_len,
        );
        if self.scratch.len() < scratch_len {
            self.scratch.resize(scratch_len, Complex::new(0.0, 0.0));
        }
        (forward, inverse, scratch_len)
    }

    /// Compute the one-sided power spectrum of `samples`
    ///
    /// # Arguments
    /// * `samples` - Time-domain samples
    /// * `sample_rate` - Sample rate in Hz
    pub fn power_spectrum(&mut self, samples: &[f64], sample_rate: f64) -> PowerSpectrum<'_> {
        let n = samples.len();
        self.power.clear();

        if n == 0 || sample_rate <= 0.0 {
            return PowerSpectrum {
                power: &self.power,
                resolution: 0.0,
            };
        }

        let mean = if self.config.remove_dc {
            samples.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };

        self.buffer.clear();
        let window = self.config.window;
        self.buffer.extend(
            samples
                .iter()
                .enumerate()
                .map(|(i, &s)| Complex::new((s - mean) * window.coefficient(i, n), 0.0)),
        );

        let (forward, _, scratch_len) = self.prepare(n);
        forward.process_with_scratch(&mut self.buffer, &mut self.scratch[..scratch_len]);

        let num_bins = n / 2 + 1;
        let norm = 1.0 / (n as f64 * n as f64);
        self.power
            .extend(self.buffer.iter().take(num_bins).map(|c| c.norm_sqr() * norm));

        PowerSpectrum {
            power: &self.power,
            resolution: sample_rate / n as f64,
        }
    }

    /// Keep only the spectral components whose magnitude is at least
    /// `fraction` of the strongest non-DC bin, writing the time-domain
    /// reconstruction into `out`.
    ///
    /// The DC component is always retained. `out` is resized to `samples.len()`.
    pub fn retain_peaks(&mut self, samples: &[f64], fraction: f64, out: &mut Vec<f64>) {
        let n = samples.len();
        out.clear();
        if n == 0 {
            return;
        }

        self.buffer.clear();
        self.buffer
            .extend(samples.iter().map(|&s| Complex::new(s, 0.0)));

        let (forward, inverse, scratch_len) = self.prepare(n);
        forward.process_with_scratch(&mut self.buffer, &mut self.scratch[..scratch_len]);

        let peak = self
            .buffer
            .iter()
            .skip(1)
            .map(|c| c.norm())
            .fold(0.0f64, f64::max);
        let cutoff = peak * fraction.max(0.0);
        for c in self.buffer.iter_mut().skip(1) {
            if c.norm() < cutoff {
                *c = Complex::new(0.0, 0.0);
            }
        }

        inverse.process_with_scratch(&mut self.buffer, &mut self.scratch[..scratch_len]);

        let scale = 1.0 / n as f64;
        out.extend(self.buffer.iter().map(|c| c.re * scale));
    }
}

impl Default for FftAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
