//! Clamped control values for effect nodes
//!
//! Every effect owns one [`ParameterStore`] built from a static table of
//! [`ParamSpec`]s. Setting a value never fails: input is clipped into the
//! declared range and the stored value is handed back, so a caller can
//! compare it with what it asked for to detect clamping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Unit attached to a parameter, for display only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamUnit {
    Ratio,
    Seconds,
    Decibels,
    Hertz,
    Percent,
}

/// Static description of one parameter: name, closed range and default
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub unit: ParamUnit,
}

impl ParamSpec {
    pub const fn new(name: &'static str, min: f32, max: f32, default: f32, unit: ParamUnit) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit,
        }
    }

    /// Clip a raw value into this parameter's range
    #[inline]
    pub fn clamp(&self, raw: f32) -> f32 {
        raw.clamp(self.min, self.max)
    }
}

/// Parameter ranges shared by the effect nodes
///
/// All parameters are clamped to these ranges to prevent invalid states
/// and ensure numerical stability.
pub mod ranges {
    use super::{ParamSpec, ParamUnit};

    // Reverb
    pub const ROOM_SIZE: ParamSpec = ParamSpec::new("room_size", 0.0, 1.0, 0.5, ParamUnit::Ratio);
    pub const REVERB_MIX: ParamSpec = ParamSpec::new("mix", 0.0, 1.0, 1.0, ParamUnit::Ratio);

    // Delay
    pub const DELAY_TIME: ParamSpec = ParamSpec::new("delay_time", 0.0, 1.0, 0.3, ParamUnit::Seconds);
    /// Capped below unity so the feedback loop always decays
    pub const FEEDBACK: ParamSpec = ParamSpec::new("feedback", 0.0, 0.95, 0.3, ParamUnit::Ratio);
    pub const DELAY_MIX: ParamSpec = ParamSpec::new("mix", 0.0, 1.0, 0.5, ParamUnit::Ratio);

    // Equalizer
    pub const EQ_LOW_GAIN: ParamSpec = ParamSpec::new("low_gain", -40.0, 40.0, 0.0, ParamUnit::Decibels);
    pub const EQ_MID_GAIN: ParamSpec = ParamSpec::new("mid_gain", -40.0, 40.0, 0.0, ParamUnit::Decibels);
    pub const EQ_HIGH_GAIN: ParamSpec = ParamSpec::new("high_gain", -40.0, 40.0, 0.0, ParamUnit::Decibels);

    // Compressor
    pub const THRESHOLD: ParamSpec = ParamSpec::new("threshold", -100.0, 0.0, -24.0, ParamUnit::Decibels);
    pub const RATIO: ParamSpec = ParamSpec::new("ratio", 1.0, 20.0, 12.0, ParamUnit::Ratio);
    pub const ATTACK: ParamSpec = ParamSpec::new("attack", 0.0, 1.0, 0.003, ParamUnit::Seconds);
    pub const RELEASE: ParamSpec = ParamSpec::new("release", 0.0, 1.0, 0.25, ParamUnit::Seconds);

    // Distortion
    pub const AMOUNT: ParamSpec = ParamSpec::new("amount", 0.0, 100.0, 50.0, ParamUnit::Percent);

    // Filter
    pub const FREQUENCY: ParamSpec = ParamSpec::new("frequency", 10.0, 22050.0, 1000.0, ParamUnit::Hertz);
    pub const Q: ParamSpec = ParamSpec::new("q", 0.0001, 1000.0, 1.0, ParamUnit::Ratio);

    // Chorus
    pub const RATE: ParamSpec = ParamSpec::new("rate", 0.1, 20.0, 1.5, ParamUnit::Hertz);
    pub const DEPTH: ParamSpec = ParamSpec::new("depth", 0.0, 1.0, 0.7, ParamUnit::Ratio);
    pub const CHORUS_DELAY: ParamSpec = ParamSpec::new("delay", 0.001, 0.1, 0.03, ParamUnit::Seconds);
    pub const CHORUS_FEEDBACK: ParamSpec = ParamSpec::new("feedback", 0.0, 0.95, 0.0, ParamUnit::Ratio);
}

/// One named scalar with its current, always in-range value
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    spec: &'static ParamSpec,
    value: f32,
}

impl Parameter {
    pub fn new(spec: &'static ParamSpec) -> Self {
        Self {
            spec,
            value: spec.default,
        }
    }

    pub fn spec(&self) -> &'static ParamSpec {
        self.spec
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Store `raw` clipped into range and return what was stored
    ///
    /// NaN carries no usable magnitude and leaves the value untouched.
    pub fn set(&mut self, raw: f32) -> f32 {
        if !raw.is_nan() {
            self.value = self.spec.clamp(raw);
        }
        self.value
    }
}

/// Per-node set of parameters, the single source of truth for control values
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    params: Vec<Parameter>,
}

impl ParameterStore {
    /// Create a store holding every spec at its default value
    pub fn new(specs: &'static [ParamSpec]) -> Self {
        Self {
            params: specs.iter().map(Parameter::new).collect(),
        }
    }

    /// Set a parameter by name
    ///
    /// Returns the clamped value that was stored, or `None` if this store
    /// has no parameter with that name.
    pub fn set(&mut self, name: &str, raw: f32) -> Option<f32> {
        let param = self.params.iter_mut().find(|p| p.spec.name == name)?;
        let stored = param.set(raw);
        trace!("Parameter {} set to {} (requested {})", name, stored, raw);
        Some(stored)
    }

    /// Current value of a parameter
    pub fn get(&self, name: &str) -> Option<f32> {
        self.params
            .iter()
            .find(|p| p.spec.name == name)
            .map(Parameter::value)
    }

    /// Current value of a parameter that is known to exist
    ///
    /// Effects use this with the names from their own spec table; a miss
    /// falls back to 0.0 rather than panicking on the audio thread.
    #[inline]
    pub(crate) fn value(&self, spec: &ParamSpec) -> f32 {
        self.get(spec.name).unwrap_or(0.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.spec.name == name)
    }

    pub fn specs(&self) -> impl Iterator<Item = &'static ParamSpec> + '_ {
        self.params.iter().map(Parameter::spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Copy of all current values keyed by name, for display
    pub fn snapshot(&self) -> BTreeMap<String, f32> {
        self.params
            .iter()
            .map(|p| (p.spec.name.to_string(), p.value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
