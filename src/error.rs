//! Error handling for the routing engine
//!
//! Structural errors (duplicate, invalid, not found) are always returned
//! before any graph mutation is committed. Hardware failures arrive from the
//! host seam as [`HostError`] and are wrapped here.

use thiserror::Error;

use crate::host::HostError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Main error type for routing engine operations
#[derive(Error, Debug)]
pub enum RoutingError {
    // Context Errors
    #[error("Audio context initialization failed: {reason}")]
    ContextInit {
        reason: String,
        #[source]
        source: Option<HostError>,
    },

    #[error("Audio context is not running (current state: {state})")]
    ContextNotReady { state: String },

    // Device Errors
    #[error("Capture access denied for device: {device_id}")]
    PermissionDenied { device_id: String },

    #[error("Device unavailable: {device_id}")]
    DeviceUnavailable { device_id: String },

    // Graph Errors
    #[error("Node already exists: {node_id}")]
    DuplicateNode { node_id: String },

    #[error("Route already exists: {route_id}")]
    DuplicateRoute { route_id: String },

    #[error("Invalid route endpoints {source_id} -> {target_id}: {reason}")]
    InvalidRouteEndpoints {
        source_id: String,
        target_id: String,
        reason: String,
    },

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Route not found: {route_id}")]
    RouteNotFound { route_id: String },

    #[error("Effect {effect_id} not found on route {route_id}")]
    EffectNotFound { route_id: String, effect_id: String },

    #[error("Unknown parameter '{name}' for {effect} effect")]
    UnknownParameter { effect: String, name: String },

    // Host Errors
    #[error("Host audio error: {0}")]
    Host(#[from] HostError),

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RoutingError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            RoutingError::ContextInit { .. } => "CONTEXT_INIT_ERROR",
            RoutingError::ContextNotReady { .. } => "CONTEXT_NOT_READY",
            RoutingError::PermissionDenied { .. } => "PERMISSION_DENIED",
            RoutingError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            RoutingError::DuplicateNode { .. } => "DUPLICATE_NODE",
            RoutingError::DuplicateRoute { .. } => "DUPLICATE_ROUTE",
            RoutingError::InvalidRouteEndpoints { .. } => "INVALID_ROUTE_ENDPOINTS",
            RoutingError::NodeNotFound { .. } => "NODE_NOT_FOUND",
            RoutingError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            RoutingError::EffectNotFound { .. } => "EFFECT_NOT_FOUND",
            RoutingError::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            RoutingError::Host(_) => "HOST_ERROR",
            RoutingError::InvalidConfig { .. } => "INVALID_CONFIG",
            RoutingError::Io(_) => "IO_ERROR",
            RoutingError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the engine instance remains usable after this error
    ///
    /// Everything except a failed initialization leaves the graph in a
    /// consistent state the caller can keep working with.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RoutingError::ContextInit { .. })
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RoutingError::ContextInit { .. } => vec![
                "Check that an audio device is connected and not held exclusively",
                "Construct a new engine instance; this one cannot be reused",
            ],
            RoutingError::ContextNotReady { .. } => vec![
                "Call start() before changing the routing graph",
                "A stopped engine cannot be restarted - create a new one",
            ],
            RoutingError::PermissionDenied { .. } => vec![
                "Grant microphone access to this application in the system settings",
                "Pick a different capture device",
            ],
            RoutingError::DeviceUnavailable { .. } => vec![
                "Refresh the device list - the device may have been unplugged",
            ],
            RoutingError::DuplicateNode { .. } => {
                vec!["The device is already active; reuse the existing node"]
            }
            RoutingError::DuplicateRoute { .. } => {
                vec!["These devices are already connected; adjust the existing route instead"]
            }
            RoutingError::InvalidRouteEndpoints { .. } => vec![
                "Routes must go from an active input device to an active output device",
            ],
            RoutingError::NodeNotFound { .. } => vec!["Activate the device before routing it"],
            RoutingError::UnknownParameter { .. } => {
                vec!["Run 'cablebus effects' to list the parameters of each effect"]
            }
            RoutingError::InvalidConfig { .. } => {
                vec!["Check the configuration file against the documented defaults"]
            }
            _ => vec![],
        }
    }

    pub(crate) fn not_ready(state: impl std::fmt::Display) -> Self {
        RoutingError::ContextNotReady {
            state: state.to_string(),
        }
    }

    /// Map a failed capture request onto the device-level variants
    pub(crate) fn capture_failed(err: HostError) -> Self {
        match err {
            HostError::PermissionDenied { device_id } => RoutingError::PermissionDenied { device_id },
            HostError::DeviceUnavailable { device_id } => {
                RoutingError::DeviceUnavailable { device_id }
            }
            other => RoutingError::Host(other),
        }
    }
}
