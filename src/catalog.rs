//! Device Catalog
//!
//! Read-only device descriptors the engine consumes. The catalog is an
//! external collaborator; the engine never mutates what it returns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Direction of a device or stream node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceDirection {
    Capture,
    Playback,
}

impl DeviceDirection {
    /// Prefix used in node ids
    pub fn node_prefix(&self) -> &'static str {
        match self {
            DeviceDirection::Capture => "input",
            DeviceDirection::Playback => "output",
        }
    }
}

impl fmt::Display for DeviceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceDirection::Capture => write!(f, "capture"),
            DeviceDirection::Playback => write!(f, "playback"),
        }
    }
}

impl FromStr for DeviceDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "capture" | "input" => Ok(DeviceDirection::Capture),
            "playback" | "output" => Ok(DeviceDirection::Playback),
            other => Err(format!("unknown device direction '{}'", other)),
        }
    }
}

/// Capability descriptor of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub direction: DeviceDirection,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_channels() -> u16 {
    2
}

fn default_sample_rate() -> u32 {
    48000
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, direction: DeviceDirection) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            direction,
            is_default: false,
            channels: default_channels(),
            sample_rate: default_sample_rate(),
        }
    }

    /// Mark as the default device of its direction
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

/// Stable device id derived from a human-readable device name
///
/// `"USB Audio (hw:1,0)"` becomes `"usb-audio-hw-1-0"`.
pub fn device_id_from_name(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            id.extend(c.to_lowercase());
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    while id.ends_with('-') {
        id.pop();
    }
    id
}

/// Source of device descriptors
pub trait DeviceCatalog {
    fn list_devices(&self) -> Vec<DeviceDescriptor>;

    /// Default device of a direction, falling back to the first listed
    fn default_device(&self, direction: DeviceDirection) -> Option<DeviceDescriptor> {
        let devices: Vec<_> = self
            .list_devices()
            .into_iter()
            .filter(|d| d.direction == direction)
            .collect();
        devices
            .iter()
            .find(|d| d.is_default)
            .or_else(|| devices.first())
            .cloned()
    }

    fn find_device(&self, id: &str, direction: DeviceDirection) -> Option<DeviceDescriptor> {
        self.list_devices()
            .into_iter()
            .find(|d| d.id == id && d.direction == direction)
    }
}

/// Fixed list of devices, e.g. loaded from a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticCatalog {
    devices: Vec<DeviceDescriptor>,
}

impl StaticCatalog {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self { devices }
    }
}

impl DeviceCatalog for StaticCatalog {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![
            DeviceDescriptor::new("mic-1", "USB Mic", DeviceDirection::Capture),
            DeviceDescriptor::new("mic-2", "Headset", DeviceDirection::Capture).as_default(),
            DeviceDescriptor::new("spk", "Speakers", DeviceDirection::Playback),
        ])
    }

    #[test]
    fn test_default_device_prefers_flag() {
        let default = catalog().default_device(DeviceDirection::Capture).unwrap();
        assert_eq!(default.id, "mic-2");
    }

    #[test]
    fn test_default_device_falls_back_to_first() {
        let default = catalog().default_device(DeviceDirection::Playback).unwrap();
        assert_eq!(default.id, "spk");
    }

    #[test]
    fn test_find_device_respects_direction() {
        assert!(catalog().find_device("spk", DeviceDirection::Capture).is_none());
        assert!(catalog().find_device("spk", DeviceDirection::Playback).is_some());
    }

    #[test]
    fn test_descriptor_json_defaults() {
        let json = r#"{"id":"x","name":"X","direction":"playback"}"#;
        let descriptor: DeviceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.channels, 2);
        assert!(!descriptor.is_default);
    }

    #[test]
    fn test_device_id_from_name() {
        assert_eq!(device_id_from_name("USB Audio (hw:1,0)"), "usb-audio-hw-1-0");
        assert_eq!(device_id_from_name("  Built-in Mic "), "built-in-mic");
        assert_eq!(device_id_from_name("default"), "default");
        assert_eq!(device_id_from_name("()"), "");
    }
}
