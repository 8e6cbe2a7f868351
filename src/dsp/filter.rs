//! Resonant lowpass filter

use super::biquad::{BiquadCoeffs, BiquadShape, BiquadState};
use super::effect::{EffectKind, Processor};
use crate::engine::AudioBuffer;

/// Single-section lowpass processor
#[derive(Debug, Clone)]
pub struct LowpassFilter {
    sample_rate: f64,
    frequency: f32,
    q: f32,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl LowpassFilter {
    /// Create a lowpass at 5 kHz, Butterworth Q
    pub fn new(sample_rate: f64) -> Self {
        let mut filter = Self {
            sample_rate,
            frequency: 5000.0,
            q: 0.707,
            coeffs: BiquadCoeffs::identity(),
            states: Vec::new(),
        };
        filter.update_coefficients();
        filter
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    fn update_coefficients(&mut self) {
        self.coeffs = BiquadCoeffs::calculate(
            BiquadShape::LowPass,
            self.sample_rate,
            self.frequency as f64,
            0.0,
            self.q as f64,
        );
    }
}

impl Processor for LowpassFilter {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.channels();
        if self.states.len() < channels {
            self.states.resize(channels, BiquadState::default());
        }
        for (ch, state) in self.states.iter_mut().enumerate().take(channels) {
            for sample in buffer.channel_mut(ch) {
                *sample = state.process(*sample as f64, &self.coeffs) as f32;
            }
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        match name {
            "frequency" => self.frequency = value,
            "q" => self.q = value,
            _ => return,
        }
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.states.iter_mut().for_each(BiquadState::reset);
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frequency: f32) -> AudioBuffer {
        let samples = (0..9600)
            .map(|n| (2.0 * std::f32::consts::PI * frequency * n as f32 / 48000.0).sin())
            .collect();
        AudioBuffer::from_channels(vec![samples])
    }

    #[test]
    fn test_passes_low_tone() {
        let mut filter = LowpassFilter::new(48000.0);
        let mut buffer = tone(200.0);
        let before = buffer.rms();
        filter.process(&mut buffer);
        assert!((buffer.rms() - before).abs() < before * 0.05);
    }

    #[test]
    fn test_attenuates_high_tone() {
        let mut filter = LowpassFilter::new(48000.0);
        filter.set_parameter("frequency", 500.0);
        assert_eq!(filter.frequency(), 500.0);
        let mut buffer = tone(8000.0);
        let before = buffer.rms();
        filter.process(&mut buffer);
        assert!(buffer.rms() < before * 0.05);
    }
}
