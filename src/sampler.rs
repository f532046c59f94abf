//! Frequency analysis over a live playback tap.
//!
//! Playback samples are mirrored into a shared ring buffer by [`AnalyserTap`];
//! [`FrequencySampler`] windows the freshest samples, runs a forward FFT, and
//! exposes smoothed byte magnitudes the way an analyser node would.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use rodio::Source;
use rustfft::{FftPlanner, num_complex::Complex};

use crate::error::InitError;

/// Shared ring of interleaved playback samples, written from the audio thread.
pub type SampleBuf = Arc<Mutex<VecDeque<f32>>>;

/// Transform size ladder, largest first. Adjustment is capped at the 512 rung
/// to keep latency bounded; the smaller tail stays for explicit selection.
pub const TRANSFORM_SIZES: [usize; 8] = [8192, 4096, 2048, 1024, 512, 256, 128, 64];
pub const DEFAULT_TRANSFORM_INDEX: usize = 3;
const TRANSFORM_FLOOR: usize = 512;

const SMOOTHING: f32 = 0.6;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Ring capacity in raw samples: enough frames for the largest transform.
pub fn ring_capacity(channels: u16) -> usize {
    TRANSFORM_SIZES[0] * channels.max(1) as usize
}

/// Source wrapper that mirrors every sample into the analyser's ring buffer.
pub struct AnalyserTap<S> {
    inner: S,
    ring: SampleBuf,
    capacity: usize,
}

impl<S> AnalyserTap<S>
where
    S: Source<Item = f32>,
{
    pub fn new(inner: S, ring: SampleBuf) -> Self {
        let capacity = ring_capacity(inner.channels());
        AnalyserTap {
            inner,
            ring,
            capacity,
        }
    }
}

impl<S> Iterator for AnalyserTap<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;
        // Never block the audio thread on the UI holding the lock.
        if let Ok(mut ring) = self.ring.try_lock() {
            if ring.len() >= self.capacity {
                ring.pop_front();
            }
            ring.push_back(sample);
        }
        Some(sample)
    }
}

impl<S> Source for AnalyserTap<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), rodio::source::SeekError> {
        let result = self.inner.try_seek(pos);
        if result.is_ok() {
            if let Ok(mut ring) = self.ring.lock() {
                ring.clear();
            }
        }
        result
    }
}

pub struct FrequencySampler {
    ring: Option<SampleBuf>,
    channels: u16,
    size_index: usize,
    planner: FftPlanner<f32>,
    smoothed: Vec<f32>,
    magnitudes: Vec<u8>,
}

impl FrequencySampler {
    pub fn new() -> Self {
        FrequencySampler {
            ring: None,
            channels: 2,
            size_index: DEFAULT_TRANSFORM_INDEX,
            planner: FftPlanner::new(),
            smoothed: Vec::new(),
            magnitudes: Vec::new(),
        }
    }

    pub fn transform_size(&self) -> usize {
        TRANSFORM_SIZES[self.size_index]
    }

    pub fn is_attached(&self) -> bool {
        self.ring.is_some()
    }

    /// Attach to a live tap. Re-attaching the same ring is a no-op that
    /// refreshes the channel count; a different ring while one is live is an
    /// error, and any failure leaves the sampler never-attached.
    pub fn attach(&mut self, ring: SampleBuf, channels: u16) -> Result<(), InitError> {
        if let Some(current) = &self.ring {
            if Arc::ptr_eq(current, &ring) {
                self.channels = channels.max(1);
                return Ok(());
            }
            return Err(InitError::AlreadyAttached);
        }
        if channels == 0 {
            return Err(InitError::Unavailable("source reports zero channels".into()));
        }
        self.ring = Some(ring);
        self.channels = channels;
        Ok(())
    }

    pub fn detach(&mut self) {
        self.ring = None;
        self.smoothed.clear();
        self.magnitudes.clear();
    }

    /// Select a transform size from the ladder; unknown sizes are ignored.
    /// Takes effect on the next `sample()` call.
    pub fn set_transform_size(&mut self, size: usize) {
        match TRANSFORM_SIZES.iter().position(|&s| s == size) {
            Some(index) => self.size_index = index,
            None => warn!("ignoring unsupported transform size {size}"),
        }
    }

    /// Move one rung along the ladder (negative delta = larger transform).
    /// The index is capped at the 512 rung. Returns the active size.
    pub fn adjust_transform_size(&mut self, delta: i32) -> usize {
        let cap = TRANSFORM_SIZES
            .iter()
            .position(|&s| s == TRANSFORM_FLOOR)
            .unwrap_or(TRANSFORM_SIZES.len() - 1);
        self.size_index = (self.size_index as i32 + delta).clamp(0, cap as i32) as usize;
        self.transform_size()
    }

    /// Byte frequency magnitudes for the freshest samples, or `None` until a
    /// tap is attached and has produced data. Length is `transform_size / 2`.
    pub fn sample(&mut self) -> Option<&[u8]> {
        let ring = self.ring.clone()?;
        let size = self.transform_size();
        let bins = size / 2;
        if self.smoothed.len() != bins {
            self.smoothed = vec![0.0; bins];
            self.magnitudes = vec![0; bins];
        }

        let channels = self.channels.max(1) as usize;
        let mut window = vec![0.0f32; size];
        {
            let ring = ring.lock().ok()?;
            let frames = ring.len() / channels;
            if frames == 0 {
                return None;
            }
            let take = frames.min(size);
            let first = frames - take;
            // Fill the tail of the window so it stays aligned to "now".
            for (i, slot) in window[size - take..].iter_mut().enumerate() {
                let frame = first + i;
                let mut sum = 0.0;
                for c in 0..channels {
                    sum += ring.get(frame * channels + c).copied().unwrap_or(0.0);
                }
                *slot = sum / channels as f32;
            }
        }

        let mut buf: Vec<Complex<f32>> = window
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let w = 0.5 * (1.0 - (2.0 * PI * i as f32 / (size as f32 - 1.0)).cos());
                Complex::new(s * w, 0.0)
            })
            .collect();
        let fft = self.planner.plan_fft_forward(size);
        fft.process(&mut buf);

        for (k, out) in self.magnitudes.iter_mut().enumerate() {
            let magnitude = buf[k].norm() / size as f32;
            let smoothed = SMOOTHING * self.smoothed[k] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[k] = smoothed;
            *out = byte_level(smoothed);
        }
        Some(&self.magnitudes)
    }
}

/// Map a linear magnitude onto 0..=255 through the analyser's dB range.
fn byte_level(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (db - MIN_DB) / (MAX_DB - MIN_DB) * 255.0;
    scaled.round().clamp(0.0, 255.0) as u8
}
