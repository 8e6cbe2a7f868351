//! Spectrum analyzer stage
//!
//! Keeps the most recent `fft_size` samples of the (mono-summed) signal
//! passing through it. After each render block the window is transformed
//! with a Blackman window, magnitudes are smoothed over time and converted
//! to decibels floored at `min_decibels`.

use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::engine::buffer::linear_to_db;
use crate::engine::AudioBuffer;

/// Analyzer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// FFT window length (power of two)
    pub fft_size: usize,
    /// Time smoothing constant in [0, 1]
    pub smoothing: f32,
    /// Floor for reported decibel values
    pub min_decibels: f32,
    /// Ceiling of the display range
    pub max_decibels: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// One snapshot of an analyzer's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerReading {
    /// `fft_size / 2` frequency bins in dB
    pub bins: Vec<f32>,
    /// Peak sample level of the window in dBFS
    pub peak_db: f32,
    /// RMS level of the window in dBFS
    pub rms_db: f32,
}

pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Ring of the latest `fft_size` samples
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let size = config.fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self {
            config: AnalyzerConfig {
                fft_size: size,
                ..config
            },
            fft,
            window: blackman_window(size),
            history: vec![0.0; size],
            write_pos: 0,
            smoothed: vec![0.0; size / 2],
            scratch: vec![Complex::new(0.0, 0.0); size],
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Feed one render block and update the smoothed spectrum
    pub fn push(&mut self, block: &AudioBuffer) {
        let size = self.history.len();
        for i in 0..block.len() {
            self.history[self.write_pos] = block.mono_sample(i);
            self.write_pos = (self.write_pos + 1) % size;
        }
        self.update_spectrum();
    }

    fn update_spectrum(&mut self) {
        let size = self.history.len();
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = self.history[(self.write_pos + i) % size];
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.config.smoothing.clamp(0.0, 1.0);
        let norm = 1.0 / size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.scratch) {
            let magnitude = bin.norm() * norm;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
    }

    /// Current bins plus peak and RMS of the window
    pub fn reading(&self) -> AnalyzerReading {
        let floor = self.config.min_decibels;
        let to_db = |linear: f32| linear_to_db(linear).max(floor);

        let peak = self.history.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        let mean_sq =
            self.history.iter().map(|s| s * s).sum::<f32>() / self.history.len() as f32;

        AnalyzerReading {
            bins: self.smoothed.iter().map(|&m| to_db(m)).collect(),
            peak_db: to_db(peak),
            rms_db: to_db(mean_sq.sqrt()),
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }
}

/// Blackman window (alpha = 0.16)
fn blackman_window(size: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..size)
        .map(|n| {
            let x = n as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frequency: f32, frames: usize) -> AudioBuffer {
        let samples = (0..frames)
            .map(|n| (2.0 * std::f32::consts::PI * frequency * n as f32 / 48000.0).sin())
            .collect();
        AudioBuffer::from_channels(vec![samples])
    }

    #[test]
    fn test_silence_reads_floor() {
        let analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default());
        let reading = analyzer.reading();
        assert_eq!(reading.bins.len(), 128);
        assert!(reading.bins.iter().all(|&b| b == -100.0));
        assert_eq!(reading.peak_db, -100.0);
        assert_eq!(reading.rms_db, -100.0);
    }

    #[test]
    fn test_tone_peaks_in_expected_bin() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default());
        // 3000 Hz at 48 kHz with 256 bins of 187.5 Hz lands on bin 16
        for _ in 0..20 {
            analyzer.push(&tone(3000.0, 256));
        }
        let reading = analyzer.reading();
        let loudest = reading
            .bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 16);
        assert!(reading.peak_db > -1.0);
        assert!((reading.rms_db - (-3.01)).abs() < 0.5);
    }

    #[test]
    fn test_fft_size_is_rounded_to_power_of_two() {
        let analyzer = SpectrumAnalyzer::new(AnalyzerConfig {
            fft_size: 300,
            ..AnalyzerConfig::default()
        });
        assert_eq!(analyzer.config().fft_size, 512);
        assert_eq!(analyzer.reading().bins.len(), 256);
    }
}
