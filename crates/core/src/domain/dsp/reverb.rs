//! Convolution reverb

use super::convolver::{ConvolutionKernel, Convolver, BLOCK_SIZE};
use super::Effect;
use crate::domain::audio::AudioFormat;
use crate::domain::generator::{impulse_length, impulse_response, DerivedBuffer, NoiseSource};
use crate::domain::params::{ranges, ParamSpec, ParameterStore};
use std::sync::Arc;
use tracing::debug;

pub(super) const ROOM_SIZE: &str = ranges::ROOM_SIZE.name;

static SPECS: [ParamSpec; 2] = [ranges::ROOM_SIZE, ranges::REVERB_MIX];

/// Rebuilds the reverb kernel and swaps it into the shared handle
///
/// The reverb owns one for its own setters; the engine's control side holds
/// another that shares the same kernel handle.
pub struct ReverbPublisher {
    kernel: Arc<DerivedBuffer<ConvolutionKernel>>,
    sample_rate: u32,
    block_size: usize,
    noise: NoiseSource,
}

impl ReverbPublisher {
    /// Generate a fresh impulse response and publish its kernel
    ///
    /// Returns the kernel it replaced.
    pub fn rebuild(&mut self, room_size: f32) -> Arc<ConvolutionKernel> {
        let kernel = build_kernel(self.sample_rate, room_size, self.block_size, &mut self.noise);
        self.kernel.publish(kernel)
    }
}

fn build_kernel(
    sample_rate: u32,
    room_size: f32,
    block_size: usize,
    noise: &mut NoiseSource,
) -> ConvolutionKernel {
    let ir = impulse_response(sample_rate, room_size, noise.as_mut());
    let kernel = ConvolutionKernel::build(&ir, sample_rate, block_size);
    debug!(
        room_size = ir.room_size(),
        partitions = kernel.partitions(),
        "Reverb impulse response regenerated"
    );
    kernel
}

/// Reverb built on a single convolution against a generated noise tail
///
/// Every room-size change regenerates the whole impulse response. The
/// previous kernel keeps playing until the new one is complete.
pub struct Reverb {
    bypass: bool,
    channels: usize,
    params: ParameterStore,
    publisher: ReverbPublisher,
    convolver: Convolver,
    dry: Vec<f32>,
}

impl Reverb {
    /// Create a reverb at the default room size
    ///
    /// `noise` is the random source for every impulse response this node
    /// generates; pass a seeded one for reproducible tails.
    pub fn new(format: &AudioFormat, mut noise: NoiseSource) -> Self {
        let sample_rate = format.sample_rate.hz();
        let channels = format.channels.count();
        let partitions = impulse_length(sample_rate).div_ceil(BLOCK_SIZE).max(1);
        let params = ParameterStore::new(&SPECS);

        let kernel = build_kernel(
            sample_rate,
            params.value(&ranges::ROOM_SIZE),
            BLOCK_SIZE,
            &mut noise,
        );
        let publisher = ReverbPublisher {
            kernel: Arc::new(DerivedBuffer::new(kernel)),
            sample_rate,
            block_size: BLOCK_SIZE,
            noise,
        };

        Self {
            bypass: false,
            channels,
            params,
            publisher,
            convolver: Convolver::new(channels, BLOCK_SIZE, partitions),
            dry: vec![0.0; channels],
        }
    }

    /// Set the room size, regenerating the impulse response
    pub fn set_room_size(&mut self, room_size: f32) -> f32 {
        if room_size.is_nan() {
            return self.room_size();
        }
        let stored = self.params.set(ROOM_SIZE, room_size).unwrap_or(room_size);
        self.publisher.rebuild(stored);
        stored
    }

    /// Set the dry/wet balance (1.0 = wet only)
    pub fn set_mix(&mut self, mix: f32) -> f32 {
        self.params
            .set(ranges::REVERB_MIX.name, mix)
            .unwrap_or(mix)
    }

    pub fn room_size(&self) -> f32 {
        self.params.value(&ranges::ROOM_SIZE)
    }

    /// Handle to the kernel currently used for convolution
    pub fn kernel_handle(&self) -> Arc<DerivedBuffer<ConvolutionKernel>> {
        Arc::clone(&self.publisher.kernel)
    }

    /// Publisher sharing this reverb's kernel handle, for use off the render thread
    pub fn publisher(&self, noise: NoiseSource) -> ReverbPublisher {
        ReverbPublisher {
            kernel: self.kernel_handle(),
            sample_rate: self.publisher.sample_rate,
            block_size: self.publisher.block_size,
            noise,
        }
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }

        let mix = self.params.value(&ranges::REVERB_MIX);
        let kernel = self.publisher.kernel.load();

        for frame in buffer.chunks_mut(self.channels) {
            let dry = &mut self.dry[..frame.len()];
            dry.copy_from_slice(frame);
            self.convolver.process_frame(frame, &kernel);
            for (wet, &dry) in frame.iter_mut().zip(dry.iter()) {
                *wet = dry * (1.0 - mix) + *wet * mix;
            }
        }
    }

    fn reset(&mut self) {
        self.convolver.reset();
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
        "Reverb"
    }

    fn params(&self) -> &ParameterStore {
        &self.params
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        if name == ROOM_SIZE {
            Some(self.set_room_size(value))
        } else {
            self.params.set(name, value)
        }
    }

    fn sync_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        self.params.set(name, value)
    }

    fn latency_samples(&self) -> usize {
        self.convolver.latency()
    }
}
