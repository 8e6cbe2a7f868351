//! Capture sources for the software host
//!
//! A capture device registered with [`SoftwareHost`](super::SoftwareHost)
//! is backed by a [`CaptureSource`]. Each opened stream gets its own copy of
//! the device's source, so two streams of the same device never share a
//! read position.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

use crate::engine::AudioBuffer;

/// Signal generator standing in for a capture device
pub trait CaptureSource: Send {
    /// Overwrite the buffer with the next block of captured audio
    fn fill(&mut self, buffer: &mut AudioBuffer, sample_rate: u32);

    /// Clone into a boxed trait object
    fn box_clone(&self) -> Box<dyn CaptureSource>;
}

impl Clone for Box<dyn CaptureSource> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Device that captures nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Silence;

impl CaptureSource for Silence {
    fn fill(&mut self, buffer: &mut AudioBuffer, _sample_rate: u32) {
        buffer.clear();
    }

    fn box_clone(&self) -> Box<dyn CaptureSource> {
        Box::new(*self)
    }
}

/// Continuous sine tone on every channel
#[derive(Debug, Clone)]
pub struct SineSource {
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl SineSource {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
        }
    }
}

impl CaptureSource for SineSource {
    fn fill(&mut self, buffer: &mut AudioBuffer, sample_rate: u32) {
        let increment = 2.0 * PI * self.frequency / sample_rate.max(1) as f32;
        let start = self.phase;
        for ch in 0..buffer.channels() {
            let mut phase = start;
            for sample in buffer.channel_mut(ch) {
                *sample = phase.sin() * self.amplitude;
                phase = (phase + increment) % (2.0 * PI);
            }
            self.phase = phase;
        }
    }

    fn box_clone(&self) -> Box<dyn CaptureSource> {
        Box::new(self.clone())
    }
}

/// Pre-recorded mono samples, optionally looped
#[derive(Debug, Clone)]
pub struct SampleSource {
    samples: Vec<f32>,
    position: usize,
    looping: bool,
}

impl SampleSource {
    pub fn new(samples: Vec<f32>, looping: bool) -> Self {
        Self {
            samples,
            position: 0,
            looping,
        }
    }
}

impl CaptureSource for SampleSource {
    fn fill(&mut self, buffer: &mut AudioBuffer, _sample_rate: u32) {
        let total = self.samples.len();
        let mut position = self.position;
        for i in 0..buffer.len() {
            let value = if position < total {
                self.samples[position]
            } else {
                0.0
            };
            for ch in 0..buffer.channels() {
                buffer.set(i, ch, value);
            }
            position += 1;
            if self.looping && total > 0 && position >= total {
                position = 0;
            }
        }
        self.position = position;
    }

    fn box_clone(&self) -> Box<dyn CaptureSource> {
        Box::new(self.clone())
    }
}

/// Capture fed from outside the render loop, e.g. a hardware input callback
///
/// Samples arrive interleaved. An underrun renders silence. Clones share
/// one queue, so the writer side is just another clone.
#[derive(Debug, Clone)]
pub struct LiveInput {
    queue: Arc<Mutex<VecDeque<f32>>>,
    channels: usize,
    capacity: usize,
}

impl LiveInput {
    /// # Arguments
    /// * `channels` - Interleaved channels per pushed frame
    /// * `capacity_frames` - Frames kept before the oldest are dropped
    pub fn new(channels: u16, capacity_frames: usize) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity_frames * channels))),
            channels,
            capacity: capacity_frames.max(1) * channels,
        }
    }

    /// Append interleaved samples, dropping the oldest once full
    pub fn push_interleaved(&self, samples: &[f32]) {
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        queue.extend(samples.iter().copied());
        let excess = queue.len().saturating_sub(self.capacity);
        queue.drain(..excess);
    }

    /// Whole frames waiting to be rendered
    pub fn buffered_frames(&self) -> usize {
        self.queue
            .lock()
            .map(|queue| queue.len() / self.channels)
            .unwrap_or(0)
    }
}

impl CaptureSource for LiveInput {
    fn fill(&mut self, buffer: &mut AudioBuffer, _sample_rate: u32) {
        buffer.clear();
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        let frames = (queue.len() / self.channels).min(buffer.len());
        for i in 0..frames {
            for ch in 0..self.channels {
                let value = queue.pop_front().unwrap_or(0.0);
                if self.channels == 1 {
                    // mono devices feed every channel
                    for out in 0..buffer.channels() {
                        buffer.set(i, out, value);
                    }
                } else {
                    buffer.set(i, ch, value);
                }
            }
        }
    }

    fn box_clone(&self) -> Box<dyn CaptureSource> {
        Box::new(self.clone())
    }
}
