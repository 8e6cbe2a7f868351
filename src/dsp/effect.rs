//! Effect kinds and the processor trait
//!
//! The set of effect kinds is closed. Every kind has a fixed parameter table
//! and one constructor in [`build_processor`]; adding a kind fails to compile
//! until both are filled in.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Compressor, Delay, Equalizer, LowpassFilter, Reverb};
use crate::engine::AudioBuffer;
use crate::error::{Result, RoutingError};

/// Named numeric parameters of an effect unit
pub type EffectParameters = BTreeMap<String, f32>;

/// The effect kinds a route can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// Three-band equalizer (low shelf, mid peak, high shelf)
    Equalizer,
    /// Feed-forward dynamics compressor
    Compressor,
    /// Freeverb-style room reverb
    Reverb,
    /// Feedback delay line
    Delay,
    /// Resonant lowpass filter
    Filter,
}

/// Range and default of one effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamSpec {
    const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
        }
    }

    /// Clamp a value into this parameter's range (NaN maps to the default)
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

const EQUALIZER_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("low_gain_db", -24.0, 24.0, 0.0),
    ParamSpec::new("mid_gain_db", -24.0, 24.0, 0.0),
    ParamSpec::new("high_gain_db", -24.0, 24.0, 0.0),
    ParamSpec::new("low_frequency", 20.0, 2000.0, 320.0),
    ParamSpec::new("mid_frequency", 100.0, 10000.0, 1000.0),
    ParamSpec::new("mid_q", 0.1, 10.0, 0.5),
    ParamSpec::new("high_frequency", 1000.0, 20000.0, 3200.0),
];

const COMPRESSOR_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("threshold_db", -60.0, 0.0, -24.0),
    ParamSpec::new("ratio", 1.0, 20.0, 4.0),
    ParamSpec::new("attack_ms", 0.1, 100.0, 3.0),
    ParamSpec::new("release_ms", 10.0, 1000.0, 250.0),
];

const REVERB_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("room_size", 0.0, 100.0, 50.0),
    ParamSpec::new("wet", 0.0, 100.0, 30.0),
    ParamSpec::new("damping", 0.0, 100.0, 50.0),
];

const DELAY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("time_ms", 1.0, 1000.0, 300.0),
    ParamSpec::new("feedback", 0.0, 95.0, 30.0),
    ParamSpec::new("wet", 0.0, 100.0, 50.0),
];

const FILTER_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("frequency", 20.0, 20000.0, 5000.0),
    ParamSpec::new("q", 0.1, 10.0, 0.707),
];

impl EffectKind {
    /// Every kind, in display order
    pub const ALL: [EffectKind; 5] = [
        EffectKind::Equalizer,
        EffectKind::Compressor,
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Filter,
    ];

    /// Lowercase identifier used in ids, logs and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::Equalizer => "equalizer",
            EffectKind::Compressor => "compressor",
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Filter => "filter",
        }
    }

    /// Parameter table for this kind
    pub fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Equalizer => EQUALIZER_PARAMS,
            EffectKind::Compressor => COMPRESSOR_PARAMS,
            EffectKind::Reverb => REVERB_PARAMS,
            EffectKind::Delay => DELAY_PARAMS,
            EffectKind::Filter => FILTER_PARAMS,
        }
    }

    /// Look up one parameter's spec
    pub fn param_spec(&self, name: &str) -> Option<&'static ParamSpec> {
        self.param_specs().iter().find(|spec| spec.name == name)
    }

    /// Fixed default parameters for a freshly created unit
    pub fn default_parameters(&self) -> EffectParameters {
        self.param_specs()
            .iter()
            .map(|spec| (spec.name.to_string(), spec.default))
            .collect()
    }

    /// Validate a parameter name and clamp its value into range
    pub fn normalize_parameter(&self, name: &str, value: f32) -> Result<f32> {
        self.param_spec(name)
            .map(|spec| spec.clamp(value))
            .ok_or_else(|| RoutingError::UnknownParameter {
                effect: self.as_str().to_string(),
                name: name.to_string(),
            })
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equalizer" | "eq" => Ok(EffectKind::Equalizer),
            "compressor" => Ok(EffectKind::Compressor),
            "reverb" => Ok(EffectKind::Reverb),
            "delay" => Ok(EffectKind::Delay),
            "filter" | "lowpass" => Ok(EffectKind::Filter),
            other => Err(format!(
                "unknown effect kind '{}' (expected one of: equalizer, compressor, reverb, delay, filter)",
                other
            )),
        }
    }
}

/// Signal processor behind an effect stage
///
/// Processors run in place on one render block. Parameter names and values
/// have already been validated against the kind's table when they arrive.
pub trait Processor: Send {
    /// Process one block in place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Apply a single (already clamped) parameter
    fn set_parameter(&mut self, name: &str, value: f32);

    /// Clear delay lines, envelopes and filter history
    fn reset(&mut self);

    /// Kind this processor implements
    fn kind(&self) -> EffectKind;
}

/// Construct the processor for a kind and apply its parameters
pub fn build_processor(
    kind: EffectKind,
    parameters: &EffectParameters,
    sample_rate: u32,
) -> Box<dyn Processor> {
    let sample_rate = sample_rate as f64;
    let mut processor: Box<dyn Processor> = match kind {
        EffectKind::Equalizer => Box::new(Equalizer::new(sample_rate)),
        EffectKind::Compressor => Box::new(Compressor::new(sample_rate)),
        EffectKind::Reverb => Box::new(Reverb::new(sample_rate)),
        EffectKind::Delay => Box::new(Delay::new(sample_rate)),
        EffectKind::Filter => Box::new(LowpassFilter::new(sample_rate)),
    };
    for (name, &value) in parameters {
        if let Some(spec) = kind.param_spec(name) {
            processor.set_parameter(spec.name, spec.clamp(value));
        }
    }
    processor
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(EffectKind::Equalizer, "low_gain_db", 0.0)]
    #[test_case(EffectKind::Compressor, "threshold_db", -24.0)]
    #[test_case(EffectKind::Compressor, "ratio", 4.0)]
    #[test_case(EffectKind::Compressor, "attack_ms", 3.0)]
    #[test_case(EffectKind::Compressor, "release_ms", 250.0)]
    #[test_case(EffectKind::Reverb, "room_size", 50.0)]
    #[test_case(EffectKind::Reverb, "wet", 30.0)]
    #[test_case(EffectKind::Delay, "time_ms", 300.0)]
    #[test_case(EffectKind::Delay, "feedback", 30.0)]
    #[test_case(EffectKind::Filter, "frequency", 5000.0)]
    fn test_default_parameters(kind: EffectKind, name: &str, expected: f32) {
        assert_eq!(kind.default_parameters().get(name), Some(&expected));
    }

    #[test]
    fn test_equalizer_has_three_flat_bands() {
        let params = EffectKind::Equalizer.default_parameters();
        for band in ["low_gain_db", "mid_gain_db", "high_gain_db"] {
            assert_eq!(params[band], 0.0);
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for kind in EffectKind::ALL {
            assert_eq!(kind.as_str().parse::<EffectKind>().unwrap(), kind);
        }
        assert!("chorus".parse::<EffectKind>().is_err());
    }

    #[test]
    fn test_normalize_parameter_clamps_and_rejects_unknown() {
        let kind = EffectKind::Compressor;
        assert_eq!(kind.normalize_parameter("ratio", 50.0).unwrap(), 20.0);
        assert_eq!(kind.normalize_parameter("ratio", f32::NAN).unwrap(), 4.0);
        let err = kind.normalize_parameter("room_size", 10.0).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PARAMETER");
    }

    #[test]
    fn test_build_processor_matches_kind() {
        for kind in EffectKind::ALL {
            let processor = build_processor(kind, &kind.default_parameters(), 48000);
            assert_eq!(processor.kind(), kind);
        }
    }
}
