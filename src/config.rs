//! Engine and host configuration
//!
//! Every field has a default, so a config file only needs the values it
//! changes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::DeviceDescriptor;
use crate::error::{Result, RoutingError};
use crate::host::AnalyzerConfig;

/// Routing engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Analyzer FFT window length
    pub fft_size: usize,
    /// Analyzer time smoothing (0-1)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Initial volume of new stream nodes (percent)
    pub default_node_volume: f32,
    /// Initial volume of new routes (percent)
    pub default_route_volume: f32,
    /// Initial master volume (percent)
    pub master_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            default_node_volume: 75.0,
            default_route_volume: 75.0,
            master_volume: 100.0,
        }
    }
}

impl EngineConfig {
    /// Analyzer settings for node stages
    pub fn analyzer(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            fft_size: self.fft_size,
            smoothing: self.smoothing,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(invalid(format!(
                "fft_size must be a power of two between 32 and 32768, got {}",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(invalid(format!(
                "smoothing must be between 0 and 1, got {}",
                self.smoothing
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(invalid(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        for (name, value) in [
            ("default_node_volume", self.default_node_volume),
            ("default_route_volume", self.default_route_volume),
            ("master_volume", self.master_volume),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Host audio subsystem settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per render block
    pub block_size: usize,
    /// Report the hardware as suspended right after opening
    pub start_suspended: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 512,
            start_suspended: false,
        }
    }
}

impl HostConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be non-zero".to_string()));
        }
        if self.channels == 0 {
            return Err(invalid("channels must be non-zero".to_string()));
        }
        if self.block_size == 0 {
            return Err(invalid("block_size must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub host: HostConfig,
    /// Devices offered by the software host
    pub devices: Vec<DeviceDescriptor>,
}

impl Config {
    /// Load and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.host.validate()
    }
}

fn invalid(reason: String) -> RoutingError {
    RoutingError::InvalidConfig { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(EngineConfig::default().analyzer(), AnalyzerConfig::default());
    }

    #[test]
    fn test_rejects_bad_fft_size() {
        let config = EngineConfig {
            fft_size: 300,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_rejects_volume_out_of_range() {
        let config = EngineConfig {
            master_volume: 120.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"host": {{"sample_rate": 44100}}}}"#).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.host.sample_rate, 44100);
        assert_eq!(config.host.channels, 2);
        assert_eq!(config.engine.fft_size, 256);
    }
}
