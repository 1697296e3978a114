//! Digital Signal Processing effects for the signal graph
//!
//! This module provides the seven effect nodes a chain is built from:
//! - Reverb (FFT convolution against a generated impulse response)
//! - Delay (feedback delay line with dry/wet mix)
//! - 3-band Equalizer (low shelf, peaking mid, high shelf)
//! - Dynamics Compressor (fixed 30 dB soft knee)
//! - Distortion (gain-compensated waveshaper)
//! - Resonant Filter (five selectable biquad modes)
//! - Chorus (LFO-modulated delay line, 50/50 mix)
//!
//! All effects are designed for:
//! - Zero allocations in the hot path
//! - Bypass that passes input through untouched
//! - Parameter changes that land on the next buffer boundary

mod chorus;
mod compressor;
mod convolver;
mod delay;
mod distortion;
mod eq;
mod filter;
mod reverb;

pub use chorus::Chorus;
pub use compressor::Compressor;
pub use convolver::{ConvolutionKernel, Convolver, BLOCK_SIZE};
pub use delay::Delay;
pub use distortion::{Distortion, DistortionPublisher};
pub use eq::Equalizer;
pub use filter::{Filter, FilterMode};
pub use reverb::{Reverb, ReverbPublisher};

use crate::domain::generator::{NoiseSource, WaveShaper};
use crate::domain::params::ParameterStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Core trait for all audio effects
///
/// All effects process audio in-place on interleaved f32 buffers normalized
/// to [-1.0, 1.0].
pub trait Effect: Send {
    /// Process a buffer of interleaved samples in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Leave the buffer untouched while bypassed
    /// - Handle buffers of any length
    fn process(&mut self, buffer: &mut [f32]);

    /// Clear signal history (delay lines, filter memories, envelopes)
    ///
    /// Derived buffers are kept.
    fn reset(&mut self);

    /// Check if effect is bypassed
    fn is_bypassed(&self) -> bool;

    /// Toggle bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;

    /// Current clamped parameter values
    fn params(&self) -> &ParameterStore;

    /// Set a parameter by name, regenerating any buffer it governs
    ///
    /// Returns the clamped value stored, or `None` for an unknown name.
    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32>;

    /// Store a value whose derived buffer has already been published
    ///
    /// Used on the render thread, where regeneration must not happen. For
    /// effects without derived buffers this is the same as `set_parameter`.
    fn sync_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        self.set_parameter(name, value)
    }

    /// Samples of delay the effect adds to the wet path
    fn latency_samples(&self) -> usize {
        0
    }
}

// ============================================================================
// EFFECT KIND
// ============================================================================

/// Tag naming one of the built-in effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Reverb,
    Delay,
    #[serde(rename = "eq")]
    Equalizer,
    Compressor,
    Distortion,
    Filter,
    Chorus,
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Equalizer,
        EffectKind::Compressor,
        EffectKind::Distortion,
        EffectKind::Filter,
        EffectKind::Chorus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Equalizer => "eq",
            EffectKind::Compressor => "compressor",
            EffectKind::Distortion => "distortion",
            EffectKind::Filter => "filter",
            EffectKind::Chorus => "chorus",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reverb" => Ok(EffectKind::Reverb),
            "delay" => Ok(EffectKind::Delay),
            "eq" | "equalizer" => Ok(EffectKind::Equalizer),
            "compressor" => Ok(EffectKind::Compressor),
            "distortion" => Ok(EffectKind::Distortion),
            "filter" => Ok(EffectKind::Filter),
            "chorus" => Ok(EffectKind::Chorus),
            _ => Err(()),
        }
    }
}

// ============================================================================
// EFFECT NODE
// ============================================================================

/// One processing node of a chain, closed over the built-in effect types
pub enum EffectNode {
    Reverb(Reverb),
    Delay(Delay),
    Equalizer(Equalizer),
    Compressor(Compressor),
    Distortion(Distortion),
    Filter(Filter),
    Chorus(Chorus),
}

impl EffectNode {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectNode::Reverb(_) => EffectKind::Reverb,
            EffectNode::Delay(_) => EffectKind::Delay,
            EffectNode::Equalizer(_) => EffectKind::Equalizer,
            EffectNode::Compressor(_) => EffectKind::Compressor,
            EffectNode::Distortion(_) => EffectKind::Distortion,
            EffectNode::Filter(_) => EffectKind::Filter,
            EffectNode::Chorus(_) => EffectKind::Chorus,
        }
    }

    pub fn as_effect(&self) -> &dyn Effect {
        match self {
            EffectNode::Reverb(e) => e,
            EffectNode::Delay(e) => e,
            EffectNode::Equalizer(e) => e,
            EffectNode::Compressor(e) => e,
            EffectNode::Distortion(e) => e,
            EffectNode::Filter(e) => e,
            EffectNode::Chorus(e) => e,
        }
    }

    pub fn as_effect_mut(&mut self) -> &mut dyn Effect {
        match self {
            EffectNode::Reverb(e) => e,
            EffectNode::Delay(e) => e,
            EffectNode::Equalizer(e) => e,
            EffectNode::Compressor(e) => e,
            EffectNode::Distortion(e) => e,
            EffectNode::Filter(e) => e,
            EffectNode::Chorus(e) => e,
        }
    }

    pub fn enable(&mut self) {
        self.set_bypass(false);
    }

    pub fn disable(&mut self) {
        self.set_bypass(true);
    }

    pub fn is_enabled(&self) -> bool {
        !self.is_bypassed()
    }

    /// Select a mode by name
    ///
    /// Only the filter has modes. Unrecognized names, and any name on other
    /// effects, leave the node unchanged and return `false`.
    pub fn set_mode(&mut self, mode: &str) -> bool {
        match self {
            EffectNode::Filter(filter) => filter.set_mode(mode),
            _ => false,
        }
    }

    /// Typed form of [`set_mode`](Self::set_mode)
    pub fn set_filter_mode(&mut self, mode: FilterMode) -> bool {
        match self {
            EffectNode::Filter(filter) => {
                filter.set_filter_mode(mode);
                true
            }
            _ => false,
        }
    }

    pub fn mode(&self) -> Option<FilterMode> {
        match self {
            EffectNode::Filter(filter) => Some(filter.mode()),
            _ => None,
        }
    }

    /// Control-side handle that rebuilds this node's derived buffer
    ///
    /// `noise` feeds impulse-response generation and is unused for other
    /// effects. Returns `None` for effects without derived buffers.
    pub fn publisher(&self, noise: NoiseSource) -> Option<BufferPublisher> {
        match self {
            EffectNode::Reverb(reverb) => Some(BufferPublisher::Reverb(reverb.publisher(noise))),
            EffectNode::Distortion(distortion) => {
                Some(BufferPublisher::Distortion(distortion.publisher()))
            }
            _ => None,
        }
    }
}

impl Effect for EffectNode {
    fn process(&mut self, buffer: &mut [f32]) {
        self.as_effect_mut().process(buffer);
    }

    fn reset(&mut self) {
        self.as_effect_mut().reset();
    }

    fn is_bypassed(&self) -> bool {
        self.as_effect().is_bypassed()
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.as_effect_mut().set_bypass(bypass);
    }

    fn name(&self) -> &str {
        self.as_effect().name()
    }

    fn params(&self) -> &ParameterStore {
        self.as_effect().params()
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        self.as_effect_mut().set_parameter(name, value)
    }

    fn sync_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        self.as_effect_mut().sync_parameter(name, value)
    }

    fn latency_samples(&self) -> usize {
        self.as_effect().latency_samples()
    }
}

impl fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectNode")
            .field("kind", &self.kind())
            .field("enabled", &self.is_enabled())
            .field("params", &self.params().snapshot())
            .finish()
    }
}

/// Rebuilds and publishes a node's derived buffer off the render thread
pub enum BufferPublisher {
    Reverb(ReverbPublisher),
    Distortion(DistortionPublisher),
}

impl BufferPublisher {
    /// Rebuild the buffer if `name` governs it
    ///
    /// `value` must already be clamped. Returns the replaced buffer when a
    /// new one was published, `None` when `name` has no derived buffer.
    pub fn rebuild(&mut self, name: &str, value: f32) -> Option<RetiredBuffer> {
        match self {
            BufferPublisher::Reverb(publisher) if name == reverb::ROOM_SIZE => {
                Some(RetiredBuffer::Kernel(publisher.rebuild(value)))
            }
            BufferPublisher::Distortion(publisher) if name == distortion::AMOUNT => {
                Some(RetiredBuffer::Shaper(publisher.rebuild(value)))
            }
            _ => None,
        }
    }
}

/// A derived buffer swapped out by [`BufferPublisher::rebuild`]
///
/// A renderer that loaded it before the swap may still be using it. Whoever
/// holds this decides which thread frees it.
pub enum RetiredBuffer {
    Kernel(Arc<ConvolutionKernel>),
    Shaper(Arc<WaveShaper>),
}
