//! 3-band equalizer

use super::Effect;
use crate::domain::audio::AudioFormat;
use crate::domain::biquad::{BiquadCoeffs, BiquadFilter};
use crate::domain::params::{ranges, ParamSpec, ParameterStore};
use tracing::trace;

static SPECS: [ParamSpec; 3] = [ranges::EQ_LOW_GAIN, ranges::EQ_MID_GAIN, ranges::EQ_HIGH_GAIN];

/// One channel's three stages, always run low, then mid, then high
#[derive(Debug, Clone, Default)]
struct BandChain {
    low: BiquadFilter,
    mid: BiquadFilter,
    high: BiquadFilter,
}

impl BandChain {
    #[inline]
    fn process_sample(&mut self, x: f32) -> f32 {
        let x = self.low.process_sample(x);
        let x = self.mid.process_sample(x);
        self.high.process_sample(x)
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }
}

/// 3-band equalizer
///
/// Three series stages:
/// - Low shelf at 320 Hz
/// - Peaking mid centered on 1 kHz
/// - High shelf at 3.2 kHz
pub struct Equalizer {
    bypass: bool,
    sample_rate: f32,
    channels: usize,
    params: ParameterStore,
    bands: Vec<BandChain>,
}

impl Equalizer {
    pub const LOW_FREQ: f32 = 320.0;
    pub const MID_FREQ: f32 = 1000.0;
    pub const HIGH_FREQ: f32 = 3200.0;

    const SHELF_Q: f32 = 0.707;
    const MID_Q: f32 = 1.0;

    pub fn new(format: &AudioFormat) -> Self {
        let channels = format.channels.count();
        let mut eq = Self {
            bypass: false,
            sample_rate: format.sample_rate.as_f32(),
            channels,
            params: ParameterStore::new(&SPECS),
            bands: vec![BandChain::default(); channels],
        };
        eq.update_coefficients();
        eq
    }

    pub fn set_low_gain(&mut self, gain_db: f32) -> Option<f32> {
        self.set_parameter(ranges::EQ_LOW_GAIN.name, gain_db)
    }

    pub fn set_mid_gain(&mut self, gain_db: f32) -> Option<f32> {
        self.set_parameter(ranges::EQ_MID_GAIN.name, gain_db)
    }

    pub fn set_high_gain(&mut self, gain_db: f32) -> Option<f32> {
        self.set_parameter(ranges::EQ_HIGH_GAIN.name, gain_db)
    }

    /// Update all filter coefficients based on current parameters
    fn update_coefficients(&mut self) {
        let low_db = self.params.value(&ranges::EQ_LOW_GAIN);
        let mid_db = self.params.value(&ranges::EQ_MID_GAIN);
        let high_db = self.params.value(&ranges::EQ_HIGH_GAIN);

        let low = BiquadCoeffs::low_shelf(self.sample_rate, Self::LOW_FREQ, low_db, Self::SHELF_Q);
        let mid = BiquadCoeffs::peaking(self.sample_rate, Self::MID_FREQ, mid_db, Self::MID_Q);
        let high = BiquadCoeffs::high_shelf(self.sample_rate, Self::HIGH_FREQ, high_db, Self::SHELF_Q);

        for band in &mut self.bands {
            band.low.set_coeffs(low);
            band.mid.set_coeffs(mid);
            band.high.set_coeffs(high);
        }

        trace!(
            "EQ updated: L={:.1}dB, M={:.1}dB, H={:.1}dB",
            low_db,
            mid_db,
            high_db
        );
    }
}

impl Effect for Equalizer {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }

        for frame in buffer.chunks_mut(self.channels) {
            for (sample, band) in frame.iter_mut().zip(self.bands.iter_mut()) {
                *sample = band.process_sample(*sample);
            }
        }
    }

    fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
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
        "Equalizer"
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
