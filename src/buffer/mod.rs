//! Real-time sample buffering
//!
//! One fixed-capacity ring buffer per channel. Pushing is O(1); the most
//! recent `W` samples are exposed as a read-only [`WindowView`] over the
//! buffer's two contiguous halves, so taking a window never copies unless the
//! caller asks for it with [`WindowView::copy_into`].
//!
//! Non-finite samples are stored as `0.0` and counted per channel.

pub mod latency;

pub use latency::{Clock, LatencyMonitor, LatencyStatus, SystemClock};

use crate::error::{EngineError, Result};
use std::collections::VecDeque;

/// Ring buffer for a single channel
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
    sanitized: u64,
    pushed: u64,
}

impl ChannelBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sanitized: 0,
            pushed: 0,
        }
    }

    /// Append a sample, dropping the oldest one when full
    #[inline]
    pub fn push(&mut self, sample: f64) {
        let sample = if sample.is_finite() {
            sample
        } else {
            self.sanitized += 1;
            0.0
        };
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.pushed += 1;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-finite samples replaced by 0.0 so far
    pub fn sanitized(&self) -> u64 {
        self.sanitized
    }

    /// Total samples ever pushed
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// The most recent `len` samples (fewer if the buffer holds fewer)
    pub fn latest(&self, len: usize) -> WindowView<'_> {
        let (a, b) = self.samples.as_slices();
        let skip = self.samples.len().saturating_sub(len);
        if skip >= a.len() {
            WindowView {
                head: &[],
                tail: &b[skip - a.len()..],
            }
        } else {
            WindowView {
                head: &a[skip..],
                tail: b,
            }
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Read-only view of a window, oldest sample first
#[derive(Debug, Clone, Copy)]
pub struct WindowView<'a> {
    head: &'a [f64],
    tail: &'a [f64],
}

impl<'a> WindowView<'a> {
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The two contiguous halves, oldest first
    pub fn as_slices(&self) -> (&'a [f64], &'a [f64]) {
        (self.head, self.tail)
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + 'a {
        self.head.iter().chain(self.tail.iter()).copied()
    }

    /// Replace the contents of `out` with this window
    pub fn copy_into(&self, out: &mut Vec<f64>) {
        out.clear();
        out.extend_from_slice(self.head);
        out.extend_from_slice(self.tail);
    }
}

/// Per-channel ring buffers for the engine
#[derive(Debug, Clone)]
pub struct RealTimeBufferManager {
    channels: Vec<ChannelBuffer>,
    window_len: usize,
}

impl RealTimeBufferManager {
    pub fn new(channels: usize, capacity: usize, window_len: usize) -> Self {
        let capacity = capacity.max(window_len);
        Self {
            channels: (0..channels).map(|_| ChannelBuffer::new(capacity)).collect(),
            window_len: window_len.max(1),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Push one sample into `channel`
    pub fn push(&mut self, channel: usize, sample: f64) -> Result<()> {
        let expected = self.channels.len();
        let buffer = self
            .channels
            .get_mut(channel)
            .ok_or(EngineError::ChannelMismatch {
                expected,
                actual: channel + 1,
            })?;
        buffer.push(sample);
        Ok(())
    }

    /// Push a `[channels][samples]` block. Nothing is written on a channel
    /// count mismatch.
    pub fn push_window(&mut self, raw: &[Vec<f64>]) -> Result<()> {
        if raw.len() != self.channels.len() {
            return Err(EngineError::ChannelMismatch {
                expected: self.channels.len(),
                actual: raw.len(),
            });
        }
        for (buffer, samples) in self.channels.iter_mut().zip(raw) {
            for &s in samples {
                buffer.push(s);
            }
        }
        Ok(())
    }

    /// The latest `window_len` samples of `channel`
    pub fn window(&self, channel: usize) -> Result<WindowView<'_>> {
        self.channels
            .get(channel)
            .map(|b| b.latest(self.window_len))
            .ok_or(EngineError::ChannelMismatch {
                expected: self.channels.len(),
                actual: channel + 1,
            })
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelBuffer> {
        self.channels.get(channel)
    }

    /// Total sanitized samples over all channels
    pub fn sanitized(&self) -> u64 {
        self.channels.iter().map(ChannelBuffer::sanitized).sum()
    }

    pub fn clear(&mut self) {
        self.channels.iter_mut().for_each(ChannelBuffer::clear);
    }
}
