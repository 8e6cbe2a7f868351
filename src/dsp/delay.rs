//! Feedback delay
//!
//! Per-channel circular buffers with a one-pole lowpass in the feedback path.
//! `feedback` and `wet` are percentages; feedback tops out at 95% so the
//! loop always decays.

use std::f32::consts::PI;

use super::effect::{EffectKind, Processor};
use crate::engine::AudioBuffer;

/// Longest delay the buffers are sized for
const MAX_DELAY_MS: f32 = 1000.0;

/// Feedback filter cutoff
const FEEDBACK_FILTER_HZ: f32 = 8000.0;

/// Delay processor
#[derive(Debug, Clone)]
pub struct Delay {
    sample_rate: f32,
    time_ms: f32,
    /// Feedback amount (0-0.95)
    feedback: f32,
    /// Wet level (0-1); dry stays at unity
    wet: f32,
    lines: Vec<Vec<f32>>,
    filter_states: Vec<f32>,
    write_pos: usize,
}

impl Delay {
    /// Create a 300 ms delay with 30% feedback and 50% wet
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            time_ms: 300.0,
            feedback: 0.3,
            wet: 0.5,
            lines: Vec::new(),
            filter_states: Vec::new(),
            write_pos: 0,
        }
    }

    /// Calculate delay in samples
    fn delay_samples(&self) -> usize {
        ((self.time_ms * self.sample_rate / 1000.0) as usize).clamp(1, self.line_len() - 1)
    }

    fn line_len(&self) -> usize {
        ((MAX_DELAY_MS + 10.0) * self.sample_rate / 1000.0) as usize + 2
    }

    fn ensure_channels(&mut self, channels: usize) {
        let len = self.line_len();
        while self.lines.len() < channels {
            self.lines.push(vec![0.0; len]);
            self.filter_states.push(0.0);
        }
    }

    /// coeff = 1 - exp(-2 * PI * fc / fs)
    fn filter_coeff(&self) -> f32 {
        1.0 - (-2.0 * PI * FEEDBACK_FILTER_HZ / self.sample_rate).exp()
    }
}

impl Processor for Delay {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.channels();
        self.ensure_channels(channels);

        let len = self.line_len();
        let delay = self.delay_samples();
        let coeff = self.filter_coeff();
        let mut write_pos = self.write_pos;

        for i in 0..buffer.len() {
            let read_pos = (write_pos + len - delay) % len;
            for ch in 0..channels {
                let input = buffer.samples[ch][i];
                let delayed = self.lines[ch][read_pos];

                let state = &mut self.filter_states[ch];
                *state += coeff * (delayed * self.feedback - *state);

                self.lines[ch][write_pos] = input + *state;
                buffer.samples[ch][i] = input + delayed * self.wet;
            }
            write_pos = (write_pos + 1) % len;
        }
        self.write_pos = write_pos;
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        match name {
            "time_ms" => self.time_ms = value.clamp(1.0, MAX_DELAY_MS),
            "feedback" => self.feedback = (value / 100.0).clamp(0.0, 0.95),
            "wet" => self.wet = (value / 100.0).clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.filter_states.fill(0.0);
        self.write_pos = 0;
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }
}
