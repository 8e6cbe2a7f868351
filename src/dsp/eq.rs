//! Three-band equalizer
//!
//! Low shelf, mid peak and high shelf sections in series. Bands at 0 dB are
//! skipped so a freshly created equalizer is transparent.

use super::biquad::{BiquadCoeffs, BiquadShape, BiquadState};
use super::effect::{EffectKind, Processor};
use crate::engine::AudioBuffer;

#[derive(Debug, Clone, Copy)]
enum Band {
    Low,
    Mid,
    High,
}

/// Three-band equalizer processor
#[derive(Debug, Clone)]
pub struct Equalizer {
    sample_rate: f64,
    low_gain_db: f32,
    mid_gain_db: f32,
    high_gain_db: f32,
    low_frequency: f32,
    mid_frequency: f32,
    mid_q: f32,
    high_frequency: f32,
    coeffs: [BiquadCoeffs; 3],
    /// Per channel, per band
    states: Vec<[BiquadState; 3]>,
}

impl Equalizer {
    /// Create a flat equalizer
    pub fn new(sample_rate: f64) -> Self {
        let mut eq = Self {
            sample_rate,
            low_gain_db: 0.0,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
            low_frequency: 320.0,
            mid_frequency: 1000.0,
            mid_q: 0.5,
            high_frequency: 3200.0,
            coeffs: [BiquadCoeffs::identity(); 3],
            states: Vec::new(),
        };
        eq.update_coefficients();
        eq
    }

    fn update_coefficients(&mut self) {
        for band in [Band::Low, Band::Mid, Band::High] {
            let (shape, frequency, gain_db, q) = match band {
                Band::Low => (BiquadShape::LowShelf, self.low_frequency, self.low_gain_db, 0.707),
                Band::Mid => (BiquadShape::Peak, self.mid_frequency, self.mid_gain_db, self.mid_q),
                Band::High => (
                    BiquadShape::HighShelf,
                    self.high_frequency,
                    self.high_gain_db,
                    0.707,
                ),
            };
            self.coeffs[band as usize] = if gain_db.abs() < 1e-3 {
                BiquadCoeffs::identity()
            } else {
                BiquadCoeffs::calculate(
                    shape,
                    self.sample_rate,
                    frequency as f64,
                    gain_db as f64,
                    q as f64,
                )
            };
        }
    }

    /// Check if every band is flat
    pub fn is_flat(&self) -> bool {
        self.coeffs.iter().all(BiquadCoeffs::is_identity)
    }
}

impl Processor for Equalizer {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.is_flat() {
            return;
        }
        let channels = buffer.channels();
        if self.states.len() < channels {
            self.states.resize(channels, [BiquadState::default(); 3]);
        }
        for (ch, states) in self.states.iter_mut().enumerate().take(channels) {
            for sample in buffer.channel_mut(ch) {
                let mut value = *sample as f64;
                for (state, coeffs) in states.iter_mut().zip(&self.coeffs) {
                    if !coeffs.is_identity() {
                        value = state.process(value, coeffs);
                    }
                }
                *sample = value as f32;
            }
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        match name {
            "low_gain_db" => self.low_gain_db = value,
            "mid_gain_db" => self.mid_gain_db = value,
            "high_gain_db" => self.high_gain_db = value,
            "low_frequency" => self.low_frequency = value,
            "mid_frequency" => self.mid_frequency = value,
            "mid_q" => self.mid_q = value,
            "high_frequency" => self.high_frequency = value,
            _ => return,
        }
        self.update_coefficients();
    }

    fn reset(&mut self) {
        for states in &mut self.states {
            for state in states.iter_mut() {
                state.reset();
            }
        }
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Equalizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, frames: usize) -> AudioBuffer {
        let samples = (0..frames)
            .map(|n| (2.0 * std::f32::consts::PI * frequency * n as f32 / 48000.0).sin() * 0.5)
            .collect();
        AudioBuffer::from_channels(vec![samples])
    }

    #[test]
    fn test_flat_equalizer_is_transparent() {
        let mut eq = Equalizer::new(48000.0);
        let original = sine(440.0, 512);
        let mut buffer = original.clone();
        eq.process(&mut buffer);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_low_shelf_boost_raises_bass() {
        let mut eq = Equalizer::new(48000.0);
        eq.set_parameter("low_gain_db", 12.0);
        assert!(!eq.is_flat());

        let mut buffer = sine(60.0, 9600);
        let before = buffer.rms();
        eq.process(&mut buffer);
        assert!(buffer.rms() > before * 2.0);
    }

    #[test]
    fn test_mid_cut_lowers_center_frequency() {
        let mut eq = Equalizer::new(48000.0);
        eq.set_parameter("mid_gain_db", -12.0);
        let mut buffer = sine(1000.0, 9600);
        let before = buffer.rms();
        eq.process(&mut buffer);
        assert!(buffer.rms() < before * 0.5);
    }
}
