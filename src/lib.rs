//! Cablebus - Live Audio Routing Graph Engine
//!
//! Routes live audio from capture devices to playback devices. Every route
//! carries its own gain stage and a reorderable effect chain, and every
//! active device node can be level-metered in real time.
//!
//! # Architecture
//!
//! - [`host`]: the host audio subsystem seam ([`AudioHost`]) and the bundled
//!   in-process [`SoftwareHost`]
//! - [`engine`]: processing context, node registry, routing graph, effect
//!   splicer and level monitor behind the [`RoutingEngine`] facade
//! - [`dsp`]: the closed set of effect kinds and their processors
//! - [`catalog`]: device descriptors supplied by the device catalog
//!
//! ```no_run
//! use cablebus::{EffectKind, RoutingEngine, SoftwareHost};
//!
//! # fn main() -> cablebus::Result<()> {
//! let mut engine = RoutingEngine::with_defaults(SoftwareHost::default());
//! engine.start()?;
//! let mic = engine.create_input_node("default")?;
//! let speakers = engine.create_output_node("speakers")?;
//! let route = engine.create_route(&mic, &speakers)?;
//! engine.add_effect(&route, EffectKind::Reverb)?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod host;

pub use catalog::{DeviceCatalog, DeviceDescriptor, DeviceDirection, StaticCatalog};
pub use config::{Config, EngineConfig, HostConfig};
pub use dsp::{EffectKind, EffectParameters};
pub use engine::{
    ContextState, EffectId, EngineStatus, LevelSnapshot, NodeId, NodeLevels, RouteId,
    RoutingEngine, SignalStage, Volume,
};
pub use error::{Result, RoutingError};
pub use host::{AudioHost, HostError, SoftwareHost, StageHandle};
