//! Derived buffers and the generators that build them
//!
//! Two effects own large precomputed arrays that depend on a single
//! parameter:
//! - Reverb: a stereo noise impulse response shaped by a decay envelope
//! - Distortion: a soft-clipping transfer curve plus gain compensation
//!
//! Generators here are pure functions of their parameters (the reverb noise
//! comes from a caller-supplied random source). Results are published through
//! [`DerivedBuffer`], which swaps a fully built value in with one atomic
//! pointer store, so a reader sees either the old buffer or the new one and
//! never a partially written one.

use crate::domain::params::ranges;
use arc_swap::{ArcSwap, Guard};
use rand::{Rng, RngCore, SeedableRng};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Seconds of reverb tail held in an impulse response
pub const IMPULSE_SECONDS: usize = 2;

/// Channels in an impulse response (always stereo)
pub const IMPULSE_CHANNELS: usize = 2;

/// Points in a distortion transfer curve, spanning input [-1, 1]
pub const CURVE_LENGTH: usize = 44100;

/// Random source used for impulse-response noise
pub type NoiseSource = Box<dyn RngCore + Send>;

/// Noise source seeded from the operating system
pub fn entropy_noise() -> NoiseSource {
    Box::new(rand::rngs::StdRng::from_entropy())
}

/// Deterministic noise source, for reproducible tails and tests
pub fn seeded_noise(seed: u64) -> NoiseSource {
    Box::new(rand::rngs::StdRng::seed_from_u64(seed))
}

/// Endless supply of noise sources
///
/// With a seed, the n-th source is `seeded_noise(seed + n)`, so two streams
/// built from the same seed hand out identical sources in the same order.
pub fn noise_stream(seed: Option<u64>) -> impl FnMut() -> NoiseSource + Send + 'static {
    let mut issued = 0_u64;
    move || {
        issued += 1;
        match seed {
            Some(seed) => seeded_noise(seed.wrapping_add(issued)),
            None => entropy_noise(),
        }
    }
}

// ============================================================================
// DERIVED BUFFER (atomic publish)
// ============================================================================

/// Shared handle to a derived buffer that can be replaced atomically
///
/// The render side calls [`load`](Self::load) once per processing pass; the
/// control side builds a complete replacement and calls
/// [`publish`](Self::publish). Neither side blocks the other.
pub struct DerivedBuffer<T> {
    current: ArcSwap<T>,
}

impl<T> DerivedBuffer<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(value),
        }
    }

    /// Lock-free read of the current buffer
    #[inline]
    pub fn load(&self) -> Guard<Arc<T>> {
        self.current.load()
    }

    /// Owned reference to the current buffer
    pub fn load_full(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Replace the current buffer with a fully built one
    ///
    /// Returns the buffer that was replaced. A reader that loaded it before
    /// the swap may still hold a reference until its processing pass ends.
    pub fn publish(&self, value: T) -> Arc<T> {
        self.current.swap(Arc::new(value))
    }
}

impl<T> fmt::Debug for DerivedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedBuffer")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

// ============================================================================
// IMPULSE RESPONSE
// ============================================================================

/// Stereo noise burst with a room-size dependent decay
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    channels: [Vec<f32>; IMPULSE_CHANNELS],
    room_size: f32,
}

impl ImpulseResponse {
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index.min(IMPULSE_CHANNELS - 1)]
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels[0].is_empty()
    }

    pub fn room_size(&self) -> f32 {
        self.room_size
    }
}

/// Length in samples of an impulse response at `sample_rate`
pub fn impulse_length(sample_rate: u32) -> usize {
    sample_rate as usize * IMPULSE_SECONDS
}

/// Decay envelope `((L - i) / L) ^ r`
///
/// Non-increasing in `index` for any `room_size` in [0, 1].
#[inline]
pub fn decay_envelope(index: usize, length: usize, room_size: f32) -> f32 {
    if length == 0 || index >= length {
        return 0.0;
    }
    ((length - index) as f32 / length as f32).powf(room_size)
}

/// Generate a fresh impulse response
///
/// Each call draws new uniform noise in [-1, 1] from `noise`, so two calls
/// with the same room size give audibly different tails unless the source
/// is seeded identically.
pub fn impulse_response<R>(sample_rate: u32, room_size: f32, noise: &mut R) -> ImpulseResponse
where
    R: Rng + ?Sized,
{
    let room_size = ranges::ROOM_SIZE.clamp(room_size);
    let length = impulse_length(sample_rate);

    let channels = std::array::from_fn(|_| {
        (0..length)
            .map(|i| noise.gen_range(-1.0f32..=1.0) * decay_envelope(i, length, room_size))
            .collect()
    });

    ImpulseResponse {
        channels,
        room_size,
    }
}

// ============================================================================
// DISTORTION CURVE
// ============================================================================

/// Transfer curve and matching gain compensation for the waveshaper
#[derive(Debug, Clone, PartialEq)]
pub struct WaveShaper {
    curve: Vec<f32>,
    amount: f32,
    input_gain: f32,
    output_gain: f32,
}

impl WaveShaper {
    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    /// Amount the curve was built for, already clamped to [0, 100]
    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn input_gain(&self) -> f32 {
        self.input_gain
    }

    pub fn output_gain(&self) -> f32 {
        self.output_gain
    }

    /// Map one sample through the curve
    ///
    /// Inputs outside [-1, 1] hold at the curve's end points; between
    /// points the curve is linearly interpolated.
    #[inline]
    pub fn shape(&self, x: f32) -> f32 {
        let last = self.curve.len() - 1;
        let position = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * last as f32;
        let index = position.floor() as usize;
        if index >= last {
            return self.curve[last];
        }
        let frac = position - index as f32;
        self.curve[index] + (self.curve[index + 1] - self.curve[index]) * frac
    }

    /// Full per-sample path: input gain, curve, output gain
    #[inline]
    pub fn process_sample(&self, x: f32) -> f32 {
        self.shape(x * self.input_gain) * self.output_gain
    }
}

/// Soft-clipping function behind the distortion curve
///
/// `((3 + k) * x * 20°) / (π + k * |x|)` with the angle in radians. Odd in
/// `x`; larger `k` steepens the knee.
#[inline]
pub fn soft_clip(x: f32, k: f32) -> f32 {
    let deg = 20.0 * PI / 180.0;
    ((3.0 + k) * x * deg) / (PI + k * x.abs())
}

/// Build the distortion transfer curve for `amount` in [0, 100]
pub fn distortion_curve(amount: f32) -> WaveShaper {
    let amount = ranges::AMOUNT.clamp(amount);
    let k = amount / 100.0;

    let curve = (0..CURVE_LENGTH)
        .map(|i| {
            let x = (2.0 * i as f32) / CURVE_LENGTH as f32 - 1.0;
            soft_clip(x, k)
        })
        .collect();

    let compensation = 1.0 + 0.5 * k;

    WaveShaper {
        curve,
        amount,
        input_gain: compensation,
        output_gain: 1.0 / compensation,
    }
}
