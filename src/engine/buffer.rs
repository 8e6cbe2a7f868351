//! Audio Buffer Management
//!
//! Render-block buffer shared by the software host, its stages and the
//! effect processors. Samples are non-interleaved 32-bit float.

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// One render block of audio
///
/// The outer Vec is channels, the inner Vec is samples. Every channel of a
/// buffer always holds the same number of samples.
///
/// # Example
/// ```
/// use cablebus::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(512, 2);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 512);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Create a silent buffer
    ///
    /// # Arguments
    /// * `num_samples` - Number of samples per channel
    /// * `channels` - Number of channels (at least one is allocated)
    pub fn new(num_samples: usize, channels: usize) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; channels.max(1)],
        }
    }

    /// Build a buffer from per-channel sample vectors
    ///
    /// Shorter channels are zero-padded to the longest one.
    pub fn from_channels(mut samples: Vec<Vec<f32>>) -> Self {
        let len = samples.iter().map(Vec::len).max().unwrap_or(0);
        if samples.is_empty() {
            samples.push(Vec::new());
        }
        for channel in &mut samples {
            channel.resize(len, 0.0);
        }
        Self { samples }
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get an immutable slice of a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get a mutable slice of a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Get a sample, or None when out of bounds
    #[inline]
    pub fn get(&self, index: usize, channel: usize) -> Option<f32> {
        self.samples.get(channel).and_then(|ch| ch.get(index)).copied()
    }

    /// Set a sample; out-of-bounds writes are ignored
    #[inline]
    pub fn set(&mut self, index: usize, channel: usize, value: f32) {
        if let Some(sample) = self.samples.get_mut(channel).and_then(|ch| ch.get_mut(index)) {
            *sample = value;
        }
    }

    /// Fill every channel with silence
    pub fn clear(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Mix another buffer into this one: self += source * gain
    ///
    /// A mono source is spread to every channel; otherwise channels are
    /// matched by index and extra source channels are dropped.
    pub fn mix_from(&mut self, source: &AudioBuffer, gain: f32) {
        if gain == 0.0 || source.is_empty() {
            return;
        }
        let frames = self.len().min(source.len());
        let source_channels = source.channels();
        for (ch, channel) in self.samples.iter_mut().enumerate() {
            let src = if source_channels == 1 {
                &source.samples[0]
            } else if ch < source_channels {
                &source.samples[ch]
            } else {
                continue;
            };
            for (out, &input) in channel[..frames].iter_mut().zip(&src[..frames]) {
                *out += input * gain;
            }
        }
    }

    /// Multiply every sample by a linear gain
    pub fn apply_gain(&mut self, gain: f32) {
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Average of all channels at one sample index
    #[inline]
    pub fn mono_sample(&self, index: usize) -> f32 {
        let channels = self.channels();
        if channels == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .samples
            .iter()
            .map(|ch| ch.get(index).copied().unwrap_or(0.0))
            .sum();
        sum / channels as f32
    }

    /// Peak absolute sample value across all channels (linear)
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// RMS level across all channels (linear)
    pub fn rms(&self) -> f32 {
        let total = self.channels() * self.len();
        if total == 0 {
            return 0.0;
        }
        let sum_squares: f64 = self
            .samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum_squares / total as f64).sqrt() as f32
    }

    /// Check that every sample is finite (no NaN/Inf)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .all(|channel| channel.iter().all(|s| s.is_finite()))
    }
}

// ============================================================================
// Tests
// ============================================================================
