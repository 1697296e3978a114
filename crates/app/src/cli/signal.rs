//! Test signals rendered through a chain

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

const SINE_HZ: f32 = 440.0;
const LEVEL: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Signal {
    /// 440 Hz sine at -6 dBFS
    Sine,
    /// Uniform white noise at -6 dBFS
    Noise,
    /// Single full-scale sample, then silence
    Impulse,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Sine => "sine",
            Signal::Noise => "noise",
            Signal::Impulse => "impulse",
        }
    }
}

/// Block-wise generator writing interleaved frames
pub struct SignalSource {
    signal: Signal,
    sample_rate: f32,
    channels: usize,
    frame: u64,
    rng: StdRng,
}

impl SignalSource {
    pub fn new(signal: Signal, sample_rate: u32, channels: usize, seed: u64) -> Self {
        Self {
            signal,
            sample_rate: sample_rate as f32,
            channels: channels.max(1),
            frame: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Overwrite `buffer` with the next frames of the signal
    pub fn fill(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_mut(self.channels) {
            let value = match self.signal {
                Signal::Sine => {
                    let t = self.frame as f32 / self.sample_rate;
                    LEVEL * (TAU * SINE_HZ * t).sin()
                }
                Signal::Noise => LEVEL * self.rng.gen_range(-1.0..=1.0),
                Signal::Impulse if self.frame == 0 => 1.0,
                Signal::Impulse => 0.0,
            };
            frame.fill(value);
            self.frame += 1;
        }
    }
}
