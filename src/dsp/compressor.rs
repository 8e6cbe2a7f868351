//! Dynamics compressor
//!
//! Feed-forward design with stereo-linked peak detection, a hard-knee gain
//! computer and one-pole attack/release smoothing of the gain.

use super::effect::{EffectKind, Processor};
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;

/// Compressor processor
#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f64,
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current smoothed gain (linear, 1.0 = no reduction)
    gain: f32,
}

impl Compressor {
    /// Create a compressor with -24 dB threshold, 4:1, 3 ms / 250 ms
    pub fn new(sample_rate: f64) -> Self {
        let mut compressor = Self {
            sample_rate,
            threshold_db: -24.0,
            ratio: 4.0,
            attack_ms: 3.0,
            release_ms: 250.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            gain: 1.0,
        };
        compressor.update_coefficients();
        compressor
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn gain_reduction_db(&self) -> f32 {
        linear_to_db(self.gain).min(0.0)
    }

    fn update_coefficients(&mut self) {
        // coeff = exp(-1 / time_in_samples)
        let attack_samples = (self.attack_ms / 1000.0) * self.sample_rate as f32;
        let release_samples = (self.release_ms / 1000.0) * self.sample_rate as f32;

        self.attack_coeff = if attack_samples > 0.0 {
            (-1.0 / attack_samples).exp()
        } else {
            0.0
        };
        self.release_coeff = if release_samples > 0.0 {
            (-1.0 / release_samples).exp()
        } else {
            0.0
        };
    }

    /// Static gain reduction for an input level, in dB (0 or negative)
    fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        if input_db <= self.threshold_db {
            0.0
        } else {
            (self.threshold_db + (input_db - self.threshold_db) / self.ratio) - input_db
        }
    }
}

impl Processor for Compressor {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let channels = buffer.channels();
        for frame in 0..buffer.len() {
            let level = (0..channels)
                .filter_map(|ch| buffer.get(frame, ch))
                .fold(0.0_f32, |max, s| max.max(s.abs()));

            let target = db_to_linear(self.compute_gain_reduction_db(linear_to_db(level)));
            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = coeff * self.gain + (1.0 - coeff) * target;

            for ch in 0..channels {
                if let Some(sample) = buffer.get(frame, ch) {
                    buffer.set(frame, ch, sample * self.gain);
                }
            }
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        match name {
            "threshold_db" => self.threshold_db = value,
            "ratio" => self.ratio = value.max(1.0),
            "attack_ms" => self.attack_ms = value,
            "release_ms" => self.release_ms = value,
            _ => return,
        }
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.gain = 1.0;
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Compressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gain_computer_hard_knee() {
        let compressor = Compressor::new(48000.0);
        assert_eq!(compressor.compute_gain_reduction_db(-30.0), 0.0);
        // 12 dB over threshold at 4:1 leaves 3 dB over, so 9 dB of reduction
        assert_relative_eq!(compressor.compute_gain_reduction_db(-12.0), -9.0, epsilon = 1e-4);
    }

    #[test]
    fn test_quiet_signal_untouched() {
        let mut compressor = Compressor::new(48000.0);
        let mut buffer = AudioBuffer::from_channels(vec![vec![0.01; 1024]]);
        compressor.process(&mut buffer);
        assert_relative_eq!(buffer.get(1023, 0).unwrap(), 0.01, epsilon = 1e-6);
        assert!(compressor.gain_reduction_db() > -0.01);
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let mut compressor = Compressor::new(48000.0);
        let mut buffer = AudioBuffer::from_channels(vec![vec![0.9; 48000]]);
        compressor.process(&mut buffer);
        assert!(buffer.get(47999, 0).unwrap() < 0.5);
        assert!(compressor.gain_reduction_db() < -6.0);

        compressor.reset();
        assert_eq!(compressor.gain_reduction_db(), 0.0);
    }
}
