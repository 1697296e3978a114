//! Feedback delay

use super::Effect;
use crate::domain::audio::AudioFormat;
use crate::domain::params::{ranges, ParamSpec, ParameterStore};

static SPECS: [ParamSpec; 3] = [ranges::DELAY_TIME, ranges::FEEDBACK, ranges::DELAY_MIX];

/// Circular buffer of one channel's history
///
/// Shared by the delay and the chorus. Reads look back from the next write
/// position, so a delay of `n` returns the sample written `n` pushes ago.
#[derive(Debug, Clone)]
pub(super) struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Allocate room for delays up to `max_delay` samples
    pub(super) fn new(max_delay: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay + 2],
            write_pos: 0,
        }
    }

    /// Longest delay this line can represent
    pub(super) fn max_delay(&self) -> usize {
        self.buffer.len() - 2
    }

    #[inline]
    pub(super) fn read(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1, len - 1);
        self.buffer[(self.write_pos + len - delay) % len]
    }

    /// Read a fractional delay with linear interpolation
    #[inline]
    pub(super) fn read_fractional(&self, delay: f32) -> f32 {
        let delay = delay.clamp(1.0, self.max_delay() as f32);
        let whole = delay.floor();
        let frac = delay - whole;
        let near = self.read(whole as usize);
        let far = self.read(whole as usize + 1);
        near + (far - near) * frac
    }

    #[inline]
    pub(super) fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub(super) fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Delay line with feedback and a dry/wet mix
///
/// Each channel's input is summed with the attenuated delayed signal and
/// written back into its line. Feedback is capped at 0.95 so the loop
/// always decays.
pub struct Delay {
    bypass: bool,
    sample_rate: f32,
    channels: usize,
    params: ParameterStore,
    lines: Vec<DelayLine>,
}

impl Delay {
    pub fn new(format: &AudioFormat) -> Self {
        let sample_rate = format.sample_rate.as_f32();
        let max_delay = (ranges::DELAY_TIME.max * sample_rate).ceil() as usize;
        let channels = format.channels.count();

        Self {
            bypass: false,
            sample_rate,
            channels,
            params: ParameterStore::new(&SPECS),
            lines: vec![DelayLine::new(max_delay.max(1)); channels],
        }
    }

    pub fn set_delay_time(&mut self, seconds: f32) -> Option<f32> {
        self.params.set(ranges::DELAY_TIME.name, seconds)
    }

    pub fn set_feedback(&mut self, feedback: f32) -> Option<f32> {
        self.params.set(ranges::FEEDBACK.name, feedback)
    }

    pub fn set_mix(&mut self, mix: f32) -> Option<f32> {
        self.params.set(ranges::DELAY_MIX.name, mix)
    }

    pub fn feedback(&self) -> f32 {
        self.params.value(&ranges::FEEDBACK)
    }

    /// Current delay in whole samples, at least one
    fn delay_samples(&self) -> usize {
        let seconds = self.params.value(&ranges::DELAY_TIME);
        ((seconds * self.sample_rate).round() as usize).max(1)
    }
}

impl Effect for Delay {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }

        let delay = self.delay_samples();
        let feedback = self.params.value(&ranges::FEEDBACK);
        let mix = self.params.value(&ranges::DELAY_MIX);

        for frame in buffer.chunks_mut(self.channels) {
            for (sample, line) in frame.iter_mut().zip(self.lines.iter_mut()) {
                let input = *sample;
                let delayed = line.read(delay);
                line.write(input + delayed * feedback);
                *sample = input * (1.0 - mix) + delayed * mix;
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
        "Delay"
    }

    fn params(&self) -> &ParameterStore {
        &self.params
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        self.params.set(name, value)
    }
}
