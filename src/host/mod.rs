//! Host audio subsystem seam
//!
//! The engine never touches native signal-processing stages directly. It
//! drives an [`AudioHost`] through opaque [`StageHandle`]s: create a stage,
//! wire it, schedule values on it, release it. [`SoftwareHost`] is the
//! bundled in-process implementation. With the `cpal-host` feature,
//! `CpalCatalog` lists real devices and feeds their input into it.

mod analyzer;
mod capture;
#[cfg(feature = "cpal-host")]
mod hardware;
mod software;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::{EffectKind, EffectParameters};

pub use analyzer::{AnalyzerConfig, AnalyzerReading, SpectrumAnalyzer};
pub use capture::{CaptureSource, LiveInput, SampleSource, Silence, SineSource};
#[cfg(feature = "cpal-host")]
pub use hardware::CpalCatalog;
pub use software::SoftwareHost;

// ============================================================================
// Handles and Specs
// ============================================================================

/// Opaque reference to a stage owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageHandle(u64);

impl StageHandle {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// Identifier of an open capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(u64);

impl StreamId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// A live capture stream granted by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStream {
    pub id: StreamId,
    /// Resolved device id (never `"default"`)
    pub device_id: String,
    pub channels: u16,
}

/// What kind of stage to create
#[derive(Debug, Clone)]
pub enum StageSpec {
    /// Gain stage with an initial linear gain
    Gain { initial: f32 },
    /// Pass-through level analyzer
    Analyzer(AnalyzerConfig),
    /// Source stage fed by an open capture stream
    Capture(StreamId),
    /// Effect processor
    Effect {
        kind: EffectKind,
        parameters: EffectParameters,
    },
}

impl StageSpec {
    pub fn label(&self) -> &'static str {
        match self {
            StageSpec::Gain { .. } => "gain",
            StageSpec::Analyzer(_) => "analyzer",
            StageSpec::Capture(_) => "capture",
            StageSpec::Effect { .. } => "effect",
        }
    }
}

/// Lifecycle state reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Running,
    Suspended,
    Closed,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostState::Running => write!(f, "running"),
            HostState::Suspended => write!(f, "suspended"),
            HostState::Closed => write!(f, "closed"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures reported by the host audio subsystem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("audio subsystem unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("capture access denied for device {device_id}")]
    PermissionDenied { device_id: String },

    #[error("no capture device {device_id}")]
    DeviceUnavailable { device_id: String },

    #[error("unknown {stage}")]
    UnknownStage { stage: StageHandle },

    #[error("unknown {stream}")]
    UnknownStream { stream: StreamId },

    #[error("cannot connect {from} -> {to}: {reason}")]
    InvalidConnection {
        from: StageHandle,
        to: StageHandle,
        reason: String,
    },

    #[error("{stage} has no parameter '{name}'")]
    Parameter { stage: StageHandle, name: String },

    #[error("{stage} is owned by the host")]
    HostOwned { stage: StageHandle },

    #[error("stage creation failed: {reason}")]
    StageCreation { reason: String },

    #[error("audio subsystem failed to close: {reason}")]
    CloseFailed { reason: String },

    #[error("audio subsystem is closed")]
    Closed,
}

// ============================================================================
// Host Trait
// ============================================================================

/// Host audio subsystem
///
/// Times are seconds on the host's hardware clock. All stage handles are
/// owned by the caller that created them; the host never hands out handles
/// it did not return from [`AudioHost::create_stage`] except the
/// destination.
pub trait AudioHost {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Allocate the hardware connection and report its initial state
    fn open(&mut self) -> Result<HostState, HostError>;

    fn resume(&mut self) -> Result<(), HostError>;

    fn suspend(&mut self) -> Result<(), HostError>;

    /// Release the hardware connection; the host cannot be reopened
    fn close(&mut self) -> Result<(), HostError>;

    fn state(&self) -> HostState;

    fn sample_rate(&self) -> u32;

    /// Current hardware clock time in seconds
    fn current_time(&self) -> f64;

    /// Hardware output stage
    fn destination(&self) -> StageHandle;

    fn create_stage(&mut self, spec: StageSpec) -> Result<StageHandle, HostError>;

    /// Disconnect a stage from everything and free it
    fn release_stage(&mut self, stage: StageHandle) -> Result<(), HostError>;

    fn connect(&mut self, from: StageHandle, to: StageHandle) -> Result<(), HostError>;

    /// Remove one edge; removing an absent edge is not an error
    fn disconnect(&mut self, from: StageHandle, to: StageHandle) -> Result<(), HostError>;

    /// Remove every outgoing edge of a stage
    fn disconnect_all(&mut self, from: StageHandle) -> Result<(), HostError>;

    /// Outgoing edges of a stage, in connection order
    fn connections(&self, from: StageHandle) -> Vec<StageHandle>;

    /// Set a gain stage's value at a point on the hardware clock
    fn schedule_gain(&mut self, stage: StageHandle, gain: f32, at_time: f64)
        -> Result<(), HostError>;

    /// Set an effect stage parameter (already validated and clamped)
    fn set_stage_parameter(
        &mut self,
        stage: StageHandle,
        name: &str,
        value: f32,
    ) -> Result<(), HostError>;

    /// Bypass an effect stage without removing it from the graph
    fn set_stage_bypass(&mut self, stage: StageHandle, bypass: bool) -> Result<(), HostError>;

    /// Request a live capture stream; `"default"` names the default device
    fn open_capture(&mut self, device_id: &str) -> Result<CaptureStream, HostError>;

    fn stop_capture(&mut self, stream: &CaptureStream) -> Result<(), HostError>;

    /// Latest reading of an analyzer stage
    fn analyzer_levels(&self, stage: StageHandle) -> Option<AnalyzerReading>;
}
