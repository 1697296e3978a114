//! Domain entities and business rules

pub mod audio;
pub mod biquad;
pub mod config;
pub mod dsp;
pub mod factory;
pub mod generator;
pub mod graph;
pub mod params;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioError, AudioFormat, ChannelCount, Result, SampleRate};
pub use config::{ChainConfig, EffectSpec};
pub use dsp::{
    Chorus, Compressor, Delay, Distortion, Effect, EffectKind, EffectNode, Equalizer, Filter,
    FilterMode, Reverb,
};
pub use factory::EffectFactory;
pub use generator::DerivedBuffer;
pub use graph::{NodeId, SignalGraph};
pub use params::{ParamSpec, ParameterStore};
