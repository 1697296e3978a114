//! Audio format descriptions and the domain error type
//!
//! Buffers handed to the effect chain are interleaved `f32` samples
//! normalized to [-1.0, 1.0]. The format is fixed for the lifetime of a
//! chain: every node is built for one sample rate and channel count.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while assembling or editing an effect chain
///
/// Out-of-range parameter values and unrecognized filter modes are not
/// errors: the former are clamped and the latter are ignored.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Factory has no constructor registered for this tag
    #[error("Unknown effect type: {0}")]
    UnknownEffect(String),

    /// No node with this id exists in the chain
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node with this id is already present in the chain
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// Reorder list is not a permutation of the current chain
    #[error("Invalid chain order: {0}")]
    InvalidOrder(String),

    /// Invalid configuration for the chain or an effect
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz96000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            96000 => SampleRate::Hz96000,
            hz => SampleRate::Custom(hz),
        }
    }

    /// Sample rate as `f32`, the form every coefficient calculation wants
    pub fn as_f32(&self) -> f32 {
        self.hz() as f32
    }
}

impl From<u32> for SampleRate {
    fn from(hz: u32) -> Self {
        SampleRate::from_hz(hz)
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.hz()
    }
}

/// Number of interleaved channels in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelCount {
    Mono,
    Stereo,
}

impl ChannelCount {
    pub fn count(&self) -> usize {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
        }
    }
}

/// Fixed format of the buffers flowing through a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    /// Frames per processing pass
    pub buffer_size: u32,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: ChannelCount, buffer_size: u32) -> Self {
        Self {
            sample_rate: SampleRate::from_hz(sample_rate),
            channels,
            buffer_size,
        }
    }

    /// Number of interleaved samples in one buffer
    pub fn samples_per_buffer(&self) -> usize {
        self.buffer_size as usize * self.channels.count()
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate.hz() < 8000 {
            return Err(AudioError::InvalidConfiguration(format!(
                "sample rate {} Hz is below 8000 Hz",
                self.sample_rate.hz()
            )));
        }
        if self.buffer_size == 0 {
            return Err(AudioError::InvalidConfiguration(
                "buffer size must be at least one frame".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz44100,
            channels: ChannelCount::Stereo,
            buffer_size: 512,
        }
    }
}
