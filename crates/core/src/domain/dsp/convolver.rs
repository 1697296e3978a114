//! Uniformly partitioned FFT convolution
//!
//! The impulse response is split into `BLOCK_SIZE` partitions, each
//! transformed once when the kernel is built. At run time every completed
//! input block is transformed, pushed into a frequency-domain delay line and
//! multiplied against all partitions (overlap-save). The wet path therefore
//! trails the input by one block.

use crate::domain::generator::{ImpulseResponse, IMPULSE_CHANNELS};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Partition length in samples
pub const BLOCK_SIZE: usize = 512;

/// Output calibration of a normalized kernel, in dB
const GAIN_CALIBRATION_DB: f32 = -58.0;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

/// Frequency-domain partitions of a normalized impulse response
pub struct ConvolutionKernel {
    block_size: usize,
    partitions: usize,
    // spectra[channel][partition], each of length 2 * block_size
    spectra: [Vec<Vec<Complex<f32>>>; IMPULSE_CHANNELS],
    room_size: f32,
}

impl ConvolutionKernel {
    /// Normalize and transform an impulse response
    ///
    /// Expensive: one FFT per partition per channel. Run on the control side.
    pub fn build(ir: &ImpulseResponse, sample_rate: u32, block_size: usize) -> Self {
        let fft_size = block_size * 2;
        let partitions = ir.len().div_ceil(block_size).max(1);
        let scale = normalization_scale(ir, sample_rate);

        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let mut scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        let spectra = std::array::from_fn(|channel| {
            let samples = ir.channel(channel);
            (0..partitions)
                .map(|p| {
                    let start = (p * block_size).min(samples.len());
                    let end = (start + block_size).min(samples.len());
                    let mut spectrum = vec![Complex::default(); fft_size];
                    for (bin, &s) in spectrum.iter_mut().zip(&samples[start..end]) {
                        bin.re = s * scale;
                    }
                    fft.process_with_scratch(&mut spectrum, &mut scratch);
                    spectrum
                })
                .collect()
        });

        Self {
            block_size,
            partitions,
            spectra,
            room_size: ir.room_size(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Room size of the impulse response this kernel came from
    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    fn partition(&self, channel: usize, index: usize) -> &[Complex<f32>] {
        &self.spectra[channel.min(IMPULSE_CHANNELS - 1)][index]
    }
}

/// RMS-based scale so that tails of any room size play back at similar level
fn normalization_scale(ir: &ImpulseResponse, sample_rate: u32) -> f32 {
    let length = ir.len().max(1);
    let energy: f32 = (0..IMPULSE_CHANNELS)
        .map(|c| ir.channel(c).iter().map(|s| s * s).sum::<f32>())
        .sum();

    let mut power = (energy / (IMPULSE_CHANNELS * length) as f32).sqrt();
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }

    let mut scale = 1.0 / power;
    scale *= 10.0_f32.powf(GAIN_CALIBRATION_DB * 0.05);
    if sample_rate > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / sample_rate as f32;
    }
    scale
}

/// Per-channel run-time state
struct Lane {
    // [previous block | current block]
    time: Vec<f32>,
    // Frequency-domain delay line, newest spectrum at `head`
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    output: Vec<f32>,
}

/// Streaming convolver; all buffers are allocated up front
pub struct Convolver {
    block_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    work: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
    lanes: Vec<Lane>,
    fill: usize,
}

impl Convolver {
    pub fn new(channels: usize, block_size: usize, partitions: usize) -> Self {
        let fft_size = block_size * 2;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let lanes = (0..channels)
            .map(|_| Lane {
                time: vec![0.0; fft_size],
                history: vec![vec![Complex::default(); fft_size]; partitions.max(1)],
                head: 0,
                output: vec![0.0; block_size],
            })
            .collect();

        Self {
            block_size,
            forward,
            inverse,
            scratch: vec![Complex::default(); scratch_len],
            work: vec![Complex::default(); fft_size],
            accum: vec![Complex::default(); fft_size],
            lanes,
            fill: 0,
        }
    }

    pub fn latency(&self) -> usize {
        self.block_size
    }

    /// Push one interleaved frame and pop the matching wet frame in place
    ///
    /// `kernel` is consulted only when a block completes.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f32], kernel: &ConvolutionKernel) {
        let block = self.block_size;
        for (lane, sample) in self.lanes.iter_mut().zip(frame.iter_mut()) {
            lane.time[block + self.fill] = *sample;
            *sample = lane.output[self.fill];
        }

        self.fill += 1;
        if self.fill == block {
            self.fill = 0;
            for channel in 0..self.lanes.len() {
                self.convolve_block(channel, kernel);
            }
        }
    }

    fn convolve_block(&mut self, channel: usize, kernel: &ConvolutionKernel) {
        let block = self.block_size;
        let fft_size = block * 2;
        let lane = &mut self.lanes[channel];

        for (bin, &s) in self.work.iter_mut().zip(lane.time.iter()) {
            *bin = Complex::new(s, 0.0);
        }
        self.forward.process_with_scratch(&mut self.work, &mut self.scratch);

        let depth = lane.history.len();
        lane.head = (lane.head + depth - 1) % depth;
        lane.history[lane.head].copy_from_slice(&self.work);

        self.accum.fill(Complex::default());
        let partitions = depth.min(kernel.partitions());
        for p in 0..partitions {
            let x = &lane.history[(lane.head + p) % depth];
            let h = kernel.partition(channel, p);
            for ((acc, a), b) in self.accum.iter_mut().zip(x.iter()).zip(h.iter()) {
                *acc += a * b;
            }
        }
        self.inverse.process_with_scratch(&mut self.accum, &mut self.scratch);

        let norm = 1.0 / fft_size as f32;
        for (out, bin) in lane.output.iter_mut().zip(&self.accum[block..]) {
            *out = bin.re * norm;
        }

        lane.time.copy_within(block.., 0);
    }

    pub fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.time.fill(0.0);
            lane.output.fill(0.0);
            for spectrum in &mut lane.history {
                spectrum.fill(Complex::default());
            }
            lane.head = 0;
        }
        self.fill = 0;
    }
}
