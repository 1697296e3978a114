//! Dynamics compressor

use super::Effect;
use crate::domain::audio::AudioFormat;
use crate::domain::params::{ranges, ParamSpec, ParameterStore};
use tracing::trace;

static SPECS: [ParamSpec; 4] = [
    ranges::THRESHOLD,
    ranges::RATIO,
    ranges::ATTACK,
    ranges::RELEASE,
];

/// Level floor used when converting silence to dB
const DB_FLOOR: f32 = -100.0;

/// Dynamic range compressor
///
/// Reduces the dynamic range of audio signals by attenuating signals above a
/// threshold. The knee is fixed at 30 dB wide, centered on the threshold.
/// Channels share one detector so the stereo image does not shift under
/// gain reduction.
pub struct Compressor {
    bypass: bool,
    sample_rate: f32,
    channels: usize,
    params: ParameterStore,
    // Coefficients (pre-computed for performance)
    attack_coeff: f32,
    release_coeff: f32,
    // Envelope follower state, linear peak
    envelope: f32,
    // Deepest gain reduction of the last buffer, in dB (<= 0)
    reduction_db: f32,
}

impl Compressor {
    /// Width of the soft knee in dB
    pub const KNEE_DB: f32 = 30.0;

    pub fn new(format: &AudioFormat) -> Self {
        let mut comp = Self {
            bypass: false,
            sample_rate: format.sample_rate.as_f32(),
            channels: format.channels.count(),
            params: ParameterStore::new(&SPECS),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            reduction_db: 0.0,
        };
        comp.update_coefficients();
        comp
    }

    /// Set the threshold in dB
    pub fn set_threshold(&mut self, threshold_db: f32) -> Option<f32> {
        self.set_parameter(ranges::THRESHOLD.name, threshold_db)
    }

    /// Set the compression ratio (1:1 = no compression, 20:1 = limiter)
    pub fn set_ratio(&mut self, ratio: f32) -> Option<f32> {
        self.set_parameter(ranges::RATIO.name, ratio)
    }

    /// Set the attack time in seconds
    pub fn set_attack(&mut self, attack_sec: f32) -> Option<f32> {
        self.set_parameter(ranges::ATTACK.name, attack_sec)
    }

    /// Set the release time in seconds
    pub fn set_release(&mut self, release_sec: f32) -> Option<f32> {
        self.set_parameter(ranges::RELEASE.name, release_sec)
    }

    /// Deepest gain reduction applied during the last processed buffer
    ///
    /// In dB, zero or negative.
    pub fn reduction(&self) -> f32 {
        self.reduction_db
    }

    fn update_coefficients(&mut self) {
        let attack = self.params.value(&ranges::ATTACK);
        let release = self.params.value(&ranges::RELEASE);
        self.attack_coeff = Self::time_coeff(attack, self.sample_rate);
        self.release_coeff = Self::time_coeff(release, self.sample_rate);
        trace!(
            "Compressor coefficients: attack={:.4} release={:.4}",
            self.attack_coeff,
            self.release_coeff
        );
    }

    /// One-pole smoothing coefficient; a zero time constant follows instantly
    fn time_coeff(seconds: f32, sample_rate: f32) -> f32 {
        if seconds <= 0.0 {
            0.0
        } else {
            (-1.0 / (seconds * sample_rate)).exp()
        }
    }

    /// Static gain curve: output level in dB for an input level in dB
    #[inline]
    fn gain_computer(input_db: f32, threshold_db: f32, ratio: f32) -> f32 {
        let over = input_db - threshold_db;
        let half_knee = Self::KNEE_DB * 0.5;

        if over <= -half_knee {
            input_db
        } else if over < half_knee {
            let x = over + half_knee;
            input_db + (1.0 / ratio - 1.0) * x * x / (2.0 * Self::KNEE_DB)
        } else {
            threshold_db + over / ratio
        }
    }

    /// Update envelope follower (peak detection with smoothing)
    #[inline]
    fn update_envelope(&mut self, input_level: f32) -> f32 {
        // Use attack coefficient for rising, release for falling
        let coeff = if input_level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };

        self.envelope = coeff * self.envelope + (1.0 - coeff) * input_level;
        self.envelope
    }

    /// Convert linear amplitude to dB (with minimum floor)
    #[inline]
    fn to_db(level: f32) -> f32 {
        if level < 1e-5 {
            DB_FLOOR
        } else {
            20.0 * level.log10()
        }
    }
}

impl Effect for Compressor {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }

        let threshold = self.params.value(&ranges::THRESHOLD);
        let ratio = self.params.value(&ranges::RATIO);
        let mut deepest = 0.0_f32;

        for frame in buffer.chunks_mut(self.channels) {
            let peak = frame.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
            let envelope_db = Self::to_db(self.update_envelope(peak));
            let reduction_db = Self::gain_computer(envelope_db, threshold, ratio) - envelope_db;
            deepest = deepest.min(reduction_db);

            let gain = 10.0_f32.powf(reduction_db / 20.0);
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }

        self.reduction_db = deepest;
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.reduction_db = 0.0;
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
        "Compressor"
    }

    fn params(&self) -> &ParameterStore {
        &self.params
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        let stored = self.params.set(name, value)?;
        if name == ranges::ATTACK.name || name == ranges::RELEASE.name {
            self.update_coefficients();
        }
        Some(stored)
    }
}
