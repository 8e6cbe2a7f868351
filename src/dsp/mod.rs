//! DSP Effects Library
//!
//! Signal processors behind a route's effect units. Every kind implements
//! [`Processor`] and is constructed through [`build_processor`].

mod biquad;
mod compressor;
mod delay;
mod effect;
mod eq;
mod filter;
mod reverb;

pub use compressor::Compressor;
pub use delay::Delay;
pub use effect::{build_processor, EffectKind, EffectParameters, ParamSpec, Processor};
pub use eq::Equalizer;
pub use filter::LowpassFilter;
pub use reverb::Reverb;
