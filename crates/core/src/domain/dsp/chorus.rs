//! LFO-modulated delay chorus

use super::delay::DelayLine;
use super::Effect;
use crate::domain::audio::AudioFormat;
use crate::domain::params::{ranges, ParamSpec, ParameterStore};
use std::f32::consts::TAU;

static SPECS: [ParamSpec; 4] = [
    ranges::RATE,
    ranges::DEPTH,
    ranges::CHORUS_DELAY,
    ranges::CHORUS_FEEDBACK,
];

/// Fixed dry/wet balance
const MIX: f32 = 0.5;

/// Chorus / flanger built from one modulated delay line per channel
///
/// A sine LFO sweeps the delay time between `delay * (1 - depth)` and
/// `delay * (1 + depth)`. Short delays with feedback give a flanger; longer
/// ones a chorus. The LFO phase survives `reset()` and bypass so the sweep
/// is never restarted.
pub struct Chorus {
    bypass: bool,
    sample_rate: f32,
    channels: usize,
    params: ParameterStore,
    lines: Vec<DelayLine>,
    phase: f32,
}

impl Chorus {
    pub fn new(format: &AudioFormat) -> Self {
        let sample_rate = format.sample_rate.as_f32();
        let channels = format.channels.count();
        // Full depth doubles the longest base delay
        let max_delay = (ranges::CHORUS_DELAY.max * 2.0 * sample_rate).ceil() as usize;

        Self {
            bypass: false,
            sample_rate,
            channels,
            params: ParameterStore::new(&SPECS),
            lines: vec![DelayLine::new(max_delay + 1); channels],
            phase: 0.0,
        }
    }

    pub fn set_rate(&mut self, hz: f32) -> Option<f32> {
        self.params.set(ranges::RATE.name, hz)
    }

    pub fn set_depth(&mut self, depth: f32) -> Option<f32> {
        self.params.set(ranges::DEPTH.name, depth)
    }

    pub fn set_delay(&mut self, seconds: f32) -> Option<f32> {
        self.params.set(ranges::CHORUS_DELAY.name, seconds)
    }

    pub fn set_feedback(&mut self, feedback: f32) -> Option<f32> {
        self.params.set(ranges::CHORUS_FEEDBACK.name, feedback)
    }

    /// Current LFO phase in radians, in [0, 2π)
    pub fn phase(&self) -> f32 {
        self.phase
    }
}

impl Effect for Chorus {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }

        let increment = TAU * self.params.value(&ranges::RATE) / self.sample_rate;
        let depth = self.params.value(&ranges::DEPTH);
        let base = self.params.value(&ranges::CHORUS_DELAY) * self.sample_rate;
        let feedback = self.params.value(&ranges::CHORUS_FEEDBACK);

        for frame in buffer.chunks_mut(self.channels) {
            let delay = base * (1.0 + depth * self.phase.sin());
            for (sample, line) in frame.iter_mut().zip(self.lines.iter_mut()) {
                let input = *sample;
                let wet = line.read_fractional(delay);
                line.write(input + wet * feedback);
                *sample = input * (1.0 - MIX) + wet * MIX;
            }

            self.phase += increment;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
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
        "Chorus"
    }

    fn params(&self) -> &ParameterStore {
        &self.params
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        self.params.set(name, value)
    }
}
