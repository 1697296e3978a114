//! Biquad IIR building blocks shared by the EQ and the resonant filter
//!
//! Coefficients follow the RBJ audio-EQ cookbook. Filters run in Direct
//! Form I, which tolerates coefficient updates between buffers without
//! audible artifacts.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Biquad filter coefficients
///
/// Coefficients are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Angular frequency terms shared by every design below
struct Prewarp {
    cos_w0: f32,
    alpha: f32,
}

impl Prewarp {
    fn new(sample_rate: f32, freq: f32, q: f32) -> Self {
        // Keep the corner strictly below Nyquist so poles stay inside the unit circle
        let freq = freq.clamp(1.0, sample_rate * 0.499);
        let w0 = 2.0 * PI * freq / sample_rate;
        Self {
            cos_w0: w0.cos(),
            alpha: w0.sin() / (2.0 * q.max(1e-4)),
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate coefficients for a low shelf filter
    ///
    /// Boosts or cuts frequencies below the corner frequency.
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Corner frequency in Hz
    /// - `gain_db`: Boost/cut in decibels
    /// - `q`: Q factor (shelf slope), typically 0.707
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    }

    /// Calculate coefficients for a high shelf filter
    ///
    /// Boosts or cuts frequencies above the corner frequency.
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    }

    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    #[must_use]
    pub fn lowpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);

        Self::normalized(
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    #[must_use]
    pub fn highpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);

        Self::normalized(
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Band-pass with constant 0 dB peak gain
    #[must_use]
    pub fn bandpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);

        Self::normalized(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    #[must_use]
    pub fn notch(sample_rate: f32, freq: f32, q: f32) -> Self {
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);

        Self::normalized(
            1.0,
            -2.0 * cos_w0,
            1.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    #[must_use]
    pub fn allpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);

        Self::normalized(
            1.0 - alpha,
            -2.0 * cos_w0,
            1.0 + alpha,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }
}

/// Stateful biquad filter using Direct Form I
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            ..Self::default()
        }
    }

    /// Update filter coefficients, keeping the signal history
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a contiguous mono buffer
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}
