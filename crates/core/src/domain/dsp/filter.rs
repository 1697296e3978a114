//! Resonant multi-mode filter

use super::Effect;
use crate::domain::audio::AudioFormat;
use crate::domain::biquad::{BiquadCoeffs, BiquadFilter};
use crate::domain::params::{ranges, ParamSpec, ParameterStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

static SPECS: [ParamSpec; 2] = [ranges::FREQUENCY, ranges::Q];

/// Response shape of the resonant filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Allpass,
}

impl FilterMode {
    pub const ALL: [FilterMode; 5] = [
        FilterMode::Lowpass,
        FilterMode::Highpass,
        FilterMode::Bandpass,
        FilterMode::Notch,
        FilterMode::Allpass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::Lowpass => "lowpass",
            FilterMode::Highpass => "highpass",
            FilterMode::Bandpass => "bandpass",
            FilterMode::Notch => "notch",
            FilterMode::Allpass => "allpass",
        }
    }

    fn coeffs(&self, sample_rate: f32, freq: f32, q: f32) -> BiquadCoeffs {
        match self {
            FilterMode::Lowpass => BiquadCoeffs::lowpass(sample_rate, freq, q),
            FilterMode::Highpass => BiquadCoeffs::highpass(sample_rate, freq, q),
            FilterMode::Bandpass => BiquadCoeffs::bandpass(sample_rate, freq, q),
            FilterMode::Notch => BiquadCoeffs::notch(sample_rate, freq, q),
            FilterMode::Allpass => BiquadCoeffs::allpass(sample_rate, freq, q),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// Single resonant biquad with a selectable mode
pub struct Filter {
    bypass: bool,
    sample_rate: f32,
    channels: usize,
    mode: FilterMode,
    params: ParameterStore,
    filters: Vec<BiquadFilter>,
}

impl Filter {
    pub fn new(format: &AudioFormat) -> Self {
        let channels = format.channels.count();
        let mut filter = Self {
            bypass: false,
            sample_rate: format.sample_rate.as_f32(),
            channels,
            mode: FilterMode::default(),
            params: ParameterStore::new(&SPECS),
            filters: vec![BiquadFilter::default(); channels],
        };
        filter.update_coefficients();
        filter
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Select the mode by name
    ///
    /// Unrecognized names leave the current mode in place and return `false`.
    pub fn set_mode(&mut self, mode: &str) -> bool {
        match mode.parse::<FilterMode>() {
            Ok(mode) => {
                self.set_filter_mode(mode);
                true
            }
            Err(()) => {
                debug!("Ignoring unknown filter mode {:?}", mode);
                false
            }
        }
    }

    pub fn set_filter_mode(&mut self, mode: FilterMode) {
        self.mode = mode;
        self.update_coefficients();
    }

    pub fn set_frequency(&mut self, freq: f32) -> Option<f32> {
        self.set_parameter(ranges::FREQUENCY.name, freq)
    }

    pub fn set_q(&mut self, q: f32) -> Option<f32> {
        self.set_parameter(ranges::Q.name, q)
    }

    fn update_coefficients(&mut self) {
        let freq = self.params.value(&ranges::FREQUENCY);
        let q = self.params.value(&ranges::Q);
        let coeffs = self.mode.coeffs(self.sample_rate, freq, q);
        for filter in &mut self.filters {
            filter.set_coeffs(coeffs);
        }
        trace!("Filter updated: {} {:.0}Hz Q={:.3}", self.mode, freq, q);
    }
}

impl Effect for Filter {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }

        for frame in buffer.chunks_mut(self.channels) {
            for (sample, filter) in frame.iter_mut().zip(self.filters.iter_mut()) {
                *sample = filter.process_sample(*sample);
            }
        }
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "Filter"
    }

    fn params(&self) -> &ParameterStore {
        &self.params
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        let stored = self.params.set(name, value)?;
        self.update_coefficients();
        Some(stored)
    }
}
