//! Freeverb-style reverb
//!
//! Eight parallel lowpass-feedback comb filters into four series allpass
//! filters per channel; the right channel's delays are offset by a fixed
//! stereo spread. Delay lengths are tuned at 44.1 kHz and scaled to the
//! running sample rate.

use super::effect::{EffectKind, Processor};
use crate::engine::AudioBuffer;

// ============================================================================
// Constants
// ============================================================================

const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

const STEREO_SPREAD: usize = 23;

const ALLPASS_GAIN: f32 = 0.5;

const ROOM_SCALE: f32 = 0.28;

const ROOM_OFFSET: f32 = 0.7;

const DAMP_SCALE: f32 = 0.4;

/// Input attenuation into the comb bank
const FIXED_GAIN: f32 = 0.015;

// ============================================================================
// Filter Building Blocks
// ============================================================================

/// Comb filter with a one-pole lowpass in its feedback path
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    delay: usize,
    filter_state: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
}

impl CombFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            write_pos: 0,
            delay: delay.max(1),
            filter_state: 0.0,
            feedback: 0.5,
            damp1: 0.5,
            damp2: 0.5,
        }
    }

    fn set_coefficients(&mut self, feedback: f32, damp: f32) {
        self.feedback = feedback;
        self.damp1 = damp;
        self.damp2 = 1.0 - damp;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.write_pos];
        self.filter_state = output * self.damp2 + self.filter_state * self.damp1;
        self.buffer[self.write_pos] = input + self.filter_state * self.feedback;
        self.write_pos = (self.write_pos + 1) % self.delay;
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

/// Schroeder allpass diffuser
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    delay: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay.max(1)],
            write_pos: 0,
            delay: delay.max(1),
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.write_pos];
        let output = delayed - input;
        self.buffer[self.write_pos] = input + delayed * ALLPASS_GAIN;
        self.write_pos = (self.write_pos + 1) % self.delay;
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Comb bank plus allpass chain for one channel
#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(sample_rate: f64, spread: usize) -> Self {
        let scale = sample_rate / REFERENCE_SAMPLE_RATE;
        let scaled = |delay: usize| (((delay + spread) as f64 * scale) as usize).max(1);
        Self {
            combs: COMB_DELAYS.iter().map(|&d| CombFilter::new(scaled(d))).collect(),
            allpasses: ALLPASS_DELAYS
                .iter()
                .map(|&d| AllpassFilter::new(scaled(d)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut output: f32 = self.combs.iter_mut().map(|comb| comb.process(input)).sum();
        for allpass in &mut self.allpasses {
            output = allpass.process(output);
        }
        output
    }

    fn set_coefficients(&mut self, feedback: f32, damp: f32) {
        for comb in &mut self.combs {
            comb.set_coefficients(feedback, damp);
        }
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllpassFilter::clear);
    }
}

// ============================================================================
// Reverb Processor
// ============================================================================

/// Reverb processor
///
/// `room_size`, `damping` and `wet` are percentages (0-100). The dry signal
/// is kept at unity; the wet level is added on top.
#[derive(Debug, Clone)]
pub struct Reverb {
    room_size: f32,
    damping: f32,
    wet: f32,
    left: Tank,
    right: Tank,
}

impl Reverb {
    /// Create a reverb with a 50% room, 50% damping and 30% wet mix
    pub fn new(sample_rate: f64) -> Self {
        let mut reverb = Self {
            room_size: 50.0,
            damping: 50.0,
            wet: 30.0,
            left: Tank::new(sample_rate, 0),
            right: Tank::new(sample_rate, STEREO_SPREAD),
        };
        reverb.update_coefficients();
        reverb
    }

    fn update_coefficients(&mut self) {
        let feedback = (self.room_size / 100.0) * ROOM_SCALE + ROOM_OFFSET;
        let damp = (self.damping / 100.0) * DAMP_SCALE;
        self.left.set_coefficients(feedback, damp);
        self.right.set_coefficients(feedback, damp);
    }
}

impl Processor for Reverb {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let wet = self.wet / 100.0;
        if wet <= 0.0 {
            return;
        }
        let stereo = buffer.channels() >= 2;
        for i in 0..buffer.len() {
            let input = buffer.mono_sample(i) * FIXED_GAIN;
            let out_left = self.left.process(input);
            if stereo {
                let out_right = self.right.process(input);
                for (ch, wet_sample) in [(0, out_left), (1, out_right)] {
                    if let Some(dry) = buffer.get(i, ch) {
                        buffer.set(i, ch, dry + wet_sample * wet);
                    }
                }
            } else if let Some(dry) = buffer.get(i, 0) {
                buffer.set(i, 0, dry + out_left * wet);
            }
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        match name {
            "room_size" => self.room_size = value,
            "damping" => self.damping = value,
            "wet" => {
                self.wet = value;
                return;
            }
            _ => return,
        }
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }
}
