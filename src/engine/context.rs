//! Audio Processing Context
//!
//! Owns the host connection, its lifecycle and the master output stage.
//!
//! ```text
//! Uninitialized --initialize--> Running <--suspend/start--> Suspended
//!        |                         |                            |
//!        +----------------------stop/close---------------------> Closed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::volume::{schedule_now, Volume};
use crate::error::{Result, RoutingError};
use crate::host::{AudioHost, HostError, HostState, StageHandle, StageSpec};

/// Lifecycle state of the processing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    #[default]
    Uninitialized,
    Running,
    Suspended,
    /// Terminal; a new engine instance is required
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Uninitialized => write!(f, "uninitialized"),
            ContextState::Running => write!(f, "running"),
            ContextState::Suspended => write!(f, "suspended"),
            ContextState::Closed => write!(f, "closed"),
        }
    }
}

/// Host connection plus master stage
pub struct ProcessingContext<H: AudioHost> {
    host: H,
    state: ContextState,
    master: Option<StageHandle>,
    master_volume: Volume,
}

impl<H: AudioHost> ProcessingContext<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            state: ContextState::Uninitialized,
            master: None,
            master_volume: Volume::MAX,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ContextState::Running
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Sample rate while the hardware connection is open
    pub fn sample_rate(&self) -> Option<u32> {
        match self.state {
            ContextState::Running | ContextState::Suspended => Some(self.host.sample_rate()),
            _ => None,
        }
    }

    pub fn master_volume(&self) -> Volume {
        self.master_volume
    }

    /// Fail with `ContextNotReady` unless running
    pub fn require_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(RoutingError::not_ready(self.state))
        }
    }

    /// Master stage all output nodes feed
    pub fn master(&self) -> Result<StageHandle> {
        self.master.ok_or_else(|| RoutingError::not_ready(self.state))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the hardware connection and allocate the master stage
    ///
    /// Any failure is fatal: the context moves to `Closed`.
    pub fn initialize(&mut self, master_volume: Volume) -> Result<()> {
        match self.state {
            ContextState::Uninitialized => {}
            ContextState::Closed => return Err(RoutingError::not_ready(self.state)),
            ContextState::Running | ContextState::Suspended => return Ok(()),
        }

        match self.open(master_volume) {
            Ok(()) => {
                self.state = ContextState::Running;
                info!(
                    host = self.host.name(),
                    sample_rate = self.host.sample_rate(),
                    "Audio context running"
                );
                Ok(())
            }
            Err(source) => {
                error!(host = self.host.name(), error = %source, "Audio context initialization failed");
                self.state = ContextState::Closed;
                if let Err(close_err) = self.host.close() {
                    warn!(error = %close_err, "Host close after failed initialization also failed");
                }
                Err(RoutingError::ContextInit {
                    reason: source.to_string(),
                    source: Some(source),
                })
            }
        }
    }

    fn open(&mut self, master_volume: Volume) -> std::result::Result<(), HostError> {
        let initial = self.host.open()?;
        if initial == HostState::Suspended {
            info!("Hardware started suspended, requesting resume");
            self.host.resume()?;
        }

        let master = self.host.create_stage(StageSpec::Gain {
            initial: master_volume.gain(),
        })?;
        let destination = self.host.destination();
        if let Err(err) = self.host.connect(master, destination) {
            if let Err(release_err) = self.host.release_stage(master) {
                warn!(stage = %master, error = %release_err, "Failed to release unwired master stage");
            }
            return Err(err);
        }
        self.master = Some(master);
        self.master_volume = master_volume;
        Ok(())
    }

    /// Resume hardware I/O; idempotent while running
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.host.resume()?;
                self.state = ContextState::Running;
                info!("Audio context resumed");
                Ok(())
            }
            ContextState::Uninitialized | ContextState::Closed => {
                Err(RoutingError::not_ready(self.state))
            }
        }
    }

    /// Pause hardware I/O; idempotent while suspended
    pub fn suspend(&mut self) -> Result<()> {
        match self.state {
            ContextState::Suspended => Ok(()),
            ContextState::Running => {
                self.host.suspend()?;
                self.state = ContextState::Suspended;
                info!("Audio context suspended");
                Ok(())
            }
            ContextState::Uninitialized | ContextState::Closed => {
                Err(RoutingError::not_ready(self.state))
            }
        }
    }

    /// Release the master stage and close the hardware connection
    ///
    /// The context is `Closed` afterwards even when the host reports a
    /// close failure; that failure is still returned.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Ok(());
        }
        let was_open = self.state != ContextState::Uninitialized;
        if let Some(master) = self.master.take() {
            if let Err(err) = self.host.release_stage(master) {
                warn!(error = %err, "Failed to release master stage");
            }
        }
        self.state = ContextState::Closed;

        if was_open {
            if let Err(err) = self.host.close() {
                error!(error = %err, "Audio context close failed");
                return Err(err.into());
            }
        }
        info!("Audio context closed");
        Ok(())
    }

    pub fn set_master_volume(&mut self, volume: Volume) -> Result<()> {
        self.require_running()?;
        let master = self.master()?;
        schedule_now(&mut self.host, master, volume.gain())?;
        self.master_volume = volume;
        Ok(())
    }
}
