//! Volume percentages and gain scheduling

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host::{AudioHost, HostError, StageHandle};

/// Volume as a percentage in [0, 100]
///
/// Construction clamps, and NaN becomes 0. The normalized gain is
/// `percent / 100`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(f32);

impl Volume {
    pub const MIN: Volume = Volume(0.0);
    pub const MAX: Volume = Volume(100.0);

    pub fn new(percent: f32) -> Self {
        if percent.is_nan() {
            Self::MIN
        } else {
            Self(percent.clamp(0.0, 100.0))
        }
    }

    pub fn percent(&self) -> f32 {
        self.0
    }

    /// Normalized linear gain (0.0-1.0)
    pub fn gain(&self) -> f32 {
        self.0 / 100.0
    }

    /// Gain to apply when the owner may be inactive
    pub fn effective_gain(&self, active: bool) -> f32 {
        if active {
            self.gain()
        } else {
            0.0
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(75.0)
    }
}

impl From<f32> for Volume {
    fn from(percent: f32) -> Self {
        Self::new(percent)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Set a gain stage immediately (at the current hardware time, no ramp)
pub(crate) fn schedule_now<H: AudioHost>(
    host: &mut H,
    stage: StageHandle,
    gain: f32,
) -> Result<(), HostError> {
    let now = host.current_time();
    host.schedule_gain(stage, gain, now)
}
