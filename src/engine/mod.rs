//! Routing Engine Module
//!
//! The audio routing graph and everything it owns:
//! - Processing context lifecycle and the master stage
//! - Stream node registry and the routing graph
//! - Effect chain splicing
//! - Level monitoring

pub mod buffer;
pub mod context;
pub mod graph;
pub mod monitor;
pub mod registry;
pub mod routing;
mod splicer;
mod transaction;
pub mod volume;

pub use buffer::AudioBuffer;
pub use context::{ContextState, ProcessingContext};
pub use graph::{EffectId, EffectInfo, EffectUnit, Route, RouteId, RouteInfo, RoutingGraph};
pub use monitor::{FrameRequest, LevelCallback, LevelMonitor, LevelSnapshot, NodeLevels};
pub use registry::{CaptureSide, NodeId, NodeInfo, NodeRegistry, StreamNode};
pub use routing::{EngineStatus, RoutingEngine, SignalStage};
pub use volume::Volume;
