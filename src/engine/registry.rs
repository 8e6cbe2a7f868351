//! Stream Node Registry
//!
//! At most one node exists per `(direction, device id)` pair. The registry
//! exclusively owns each node's stages and, for capture nodes, the live
//! capture stream.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::volume::Volume;
use crate::catalog::DeviceDirection;
use crate::host::{CaptureStream, StageHandle};

// ============================================================================
// Node Identity
// ============================================================================

/// Logical node id: direction plus device id
///
/// Displayed as `input-<device>` or `output-<device>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    direction: DeviceDirection,
    device_id: String,
}

impl NodeId {
    pub fn new(direction: DeviceDirection, device_id: impl Into<String>) -> Self {
        Self {
            direction,
            device_id: device_id.into(),
        }
    }

    pub fn input(device_id: impl Into<String>) -> Self {
        Self::new(DeviceDirection::Capture, device_id)
    }

    pub fn output(device_id: impl Into<String>) -> Self {
        Self::new(DeviceDirection::Playback, device_id)
    }

    pub fn direction(&self) -> DeviceDirection {
        self.direction
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_input(&self) -> bool {
        self.direction == DeviceDirection::Capture
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.direction.node_prefix(), self.device_id)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (direction, device_id) = if let Some(rest) = s.strip_prefix("input-") {
            (DeviceDirection::Capture, rest)
        } else if let Some(rest) = s.strip_prefix("output-") {
            (DeviceDirection::Playback, rest)
        } else {
            return Err(format!(
                "node id '{}' must start with 'input-' or 'output-'",
                s
            ));
        };
        if device_id.is_empty() {
            return Err(format!("node id '{}' has no device id", s));
        }
        Ok(Self::new(direction, device_id))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Stream Node
// ============================================================================

/// Live capture resources of an input node
#[derive(Debug, Clone)]
pub struct CaptureSide {
    pub stream: CaptureStream,
    pub source: StageHandle,
}

/// An active input or output node
#[derive(Debug, Clone)]
pub struct StreamNode {
    id: NodeId,
    pub(crate) active: bool,
    pub(crate) volume: Volume,
    gain: StageHandle,
    analyzer: StageHandle,
    capture: Option<CaptureSide>,
}

impl StreamNode {
    pub(crate) fn new(
        id: NodeId,
        volume: Volume,
        gain: StageHandle,
        analyzer: StageHandle,
        capture: Option<CaptureSide>,
    ) -> Self {
        Self {
            id,
            active: true,
            volume,
            gain,
            analyzer,
            capture,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn gain_stage(&self) -> StageHandle {
        self.gain
    }

    pub fn analyzer_stage(&self) -> StageHandle {
        self.analyzer
    }

    pub fn capture(&self) -> Option<&CaptureSide> {
        self.capture.as_ref()
    }

    pub(crate) fn take_capture(&mut self) -> Option<CaptureSide> {
        self.capture.take()
    }
}

/// Serializable summary of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub direction: DeviceDirection,
    pub active: bool,
    pub volume: Volume,
}

impl From<&StreamNode> for NodeInfo {
    fn from(node: &StreamNode) -> Self {
        Self {
            id: node.id.clone(),
            direction: node.id.direction,
            active: node.active,
            volume: node.volume,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<NodeId, StreamNode>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&StreamNode> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Option<&mut StreamNode> {
        self.nodes.get_mut(id)
    }

    /// Register a node; returns false (and keeps the existing one) on duplicate
    pub(crate) fn insert(&mut self, node: StreamNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    pub(crate) fn remove(&mut self, id: &NodeId) -> Option<StreamNode> {
        self.nodes.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn count(&self, direction: DeviceDirection) -> usize {
        self.nodes
            .keys()
            .filter(|id| id.direction == direction)
            .count()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_and_parse() {
        let id = NodeId::input("usb-mic-1");
        assert_eq!(id.to_string(), "input-usb-mic-1");
        assert_eq!("input-usb-mic-1".parse::<NodeId>().unwrap(), id);
        assert_eq!(
            "output-spk".parse::<NodeId>().unwrap().direction(),
            DeviceDirection::Playback
        );
        assert!("mic".parse::<NodeId>().is_err());
        assert!("input-".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_serializes_as_string() {
        let json = serde_json::to_string(&NodeId::output("spk")).unwrap();
        assert_eq!(json, "\"output-spk\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeId::output("spk"));
    }

    #[test]
    fn test_duplicate_insert_keeps_existing() {
        let mut registry = NodeRegistry::new();
        let id = NodeId::input("mic");
        let first = StreamNode::new(
            id.clone(),
            Volume::new(10.0),
            StageHandle::new(1),
            StageHandle::new(2),
            None,
        );
        let second = StreamNode::new(
            id.clone(),
            Volume::new(90.0),
            StageHandle::new(3),
            StageHandle::new(4),
            None,
        );
        assert!(registry.insert(first));
        assert!(!registry.insert(second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).unwrap().volume().percent(), 10.0);
        assert_eq!(registry.count(DeviceDirection::Capture), 1);
        assert_eq!(registry.count(DeviceDirection::Playback), 0);
    }
}
