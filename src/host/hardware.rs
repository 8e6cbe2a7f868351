//! Hardware Devices via cpal
//!
//! [`CpalCatalog`] lists the platform's input and output devices (ALSA on
//! Linux, CoreAudio on macOS, WASAPI on Windows). It can also open an input
//! stream per capture device and register each one with a [`SoftwareHost`]
//! as a [`LiveInput`], so the routing engine renders live audio.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

use super::{HostError, LiveInput, SoftwareHost};
use crate::catalog::{device_id_from_name, DeviceCatalog, DeviceDescriptor, DeviceDirection};
use crate::config::HostConfig;

/// One second of buffered input at 48 kHz
const LIVE_INPUT_FRAMES: usize = 48000;

fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

/// Device catalog backed by the platform's default audio host
pub struct CpalCatalog {
    host: cpal::Host,
}

impl CpalCatalog {
    pub fn new() -> Self {
        let host = cpal::default_host();
        info!(host = host.id().name(), "cpal host initialized");
        Self { host }
    }

    fn describe(
        &self,
        device: &cpal::Device,
        direction: DeviceDirection,
        default_name: Option<&str>,
    ) -> Option<DeviceDescriptor> {
        let name = device_name(device)?;
        let config = match direction {
            DeviceDirection::Capture => device.default_input_config(),
            DeviceDirection::Playback => device.default_output_config(),
        };
        let config = match config {
            Ok(config) => config,
            Err(err) => {
                debug!(device = %name, %direction, error = %err, "Skipping device without a default config");
                return None;
            }
        };

        let id = device_id_from_name(&name);
        if id.is_empty() {
            return None;
        }
        let descriptor = DeviceDescriptor::new(id, name.clone(), direction)
            .with_channels(config.channels())
            .with_sample_rate(config.sample_rate());
        Some(if default_name == Some(name.as_str()) {
            descriptor.as_default()
        } else {
            descriptor
        })
    }

    fn find_input(&self, device_id: &str) -> Result<cpal::Device, HostError> {
        let devices = self
            .host
            .input_devices()
            .map_err(|e| HostError::Unavailable {
                reason: e.to_string(),
            })?;
        devices
            .into_iter()
            .find(|device| {
                device_name(device).is_some_and(|name| device_id_from_name(&name) == device_id)
            })
            .ok_or_else(|| HostError::DeviceUnavailable {
                device_id: device_id.to_string(),
            })
    }

    /// Start an input stream on a capture device
    ///
    /// Returns the stream and the queue its callback fills. Audio flows
    /// only while the stream is alive.
    pub fn open_input(&self, device_id: &str) -> Result<(cpal::Stream, LiveInput), HostError> {
        let device = self.find_input(device_id)?;
        let config = device
            .default_input_config()
            .map_err(|e| HostError::Unavailable {
                reason: format!("no input config for {}: {}", device_id, e),
            })?
            .config();

        let input = LiveInput::new(config.channels, LIVE_INPUT_FRAMES);
        let writer = input.clone();
        let id = device_id.to_string();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    writer.push_interleaved(data);
                },
                move |err| {
                    warn!(device = %id, error = %err, "Input stream error");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => HostError::DeviceUnavailable {
                    device_id: device_id.to_string(),
                },
                other => HostError::Unavailable {
                    reason: other.to_string(),
                },
            })?;
        stream.play().map_err(|e| HostError::Unavailable {
            reason: e.to_string(),
        })?;

        info!(
            device = device_id,
            channels = config.channels,
            sample_rate = config.sample_rate,
            "Input stream started"
        );
        Ok((stream, input))
    }

    /// Software host whose capture devices are live hardware inputs
    ///
    /// Inputs that fail to open are left out with a warning. Keep the
    /// returned streams alive for as long as the host renders.
    pub fn live_host(&self, config: HostConfig) -> (SoftwareHost, Vec<cpal::Stream>) {
        let mut host = SoftwareHost::new(config);
        let mut streams = Vec::new();
        for device in self.list_devices() {
            match device.direction {
                DeviceDirection::Capture => match self.open_input(&device.id) {
                    Ok((stream, input)) => {
                        host.add_capture_device(device, Box::new(input));
                        streams.push(stream);
                    }
                    Err(err) => {
                        warn!(device = %device.id, error = %err, "Capture device left out");
                    }
                },
                DeviceDirection::Playback => host = host.with_playback_device(device),
            }
        }
        (host, streams)
    }
}

impl Default for CpalCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCatalog for CpalCatalog {
    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let mut devices = Vec::new();

        let default_input = self
            .host
            .default_input_device()
            .as_ref()
            .and_then(device_name);
        if let Ok(inputs) = self.host.input_devices() {
            devices.extend(inputs.filter_map(|device| {
                self.describe(&device, DeviceDirection::Capture, default_input.as_deref())
            }));
        }

        let default_output = self
            .host
            .default_output_device()
            .as_ref()
            .and_then(device_name);
        if let Ok(outputs) = self.host.output_devices() {
            devices.extend(outputs.filter_map(|device| {
                self.describe(&device, DeviceDirection::Playback, default_output.as_deref())
            }));
        }

        devices
    }
}
