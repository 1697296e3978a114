//! Signal helpers shared by the integration tests

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

/// Interleaved sine with the same value on every channel
pub fn sine(frequency: f32, sample_rate: u32, frames: usize, channels: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let value = (TAU * frequency * i as f32 / sample_rate as f32).sin();
            std::iter::repeat(value).take(channels)
        })
        .collect()
}

/// Seeded uniform noise in [-amplitude, amplitude]
pub fn noise(seed: u64, len: usize, amplitude: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| rng.gen_range(-amplitude..=amplitude))
        .collect()
}

/// Unit impulse on every channel of the first frame
pub fn impulse(frames: usize, channels: usize) -> Vec<f32> {
    let mut buffer = vec![0.0; frames * channels];
    for sample in buffer.iter_mut().take(channels) {
        *sample = 1.0;
    }
    buffer
}

pub fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0, |acc, s| acc.max(s.abs()))
}

pub fn rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
}

/// Largest sample-wise difference between two buffers of equal length
pub fn max_difference(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "buffers differ in length");
    a.iter()
        .zip(b)
        .fold(0.0, |acc, (x, y)| acc.max((x - y).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_layout() {
        assert_eq!(impulse(3, 2), vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_levels() {
        let buffer = [0.5, -1.0, 0.5, 0.0];
        assert_eq!(peak(&buffer), 1.0);
        assert!((rms(&buffer) - (1.5_f32 / 4.0).sqrt()).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_sine_interleaved() {
        let buffer = sine(1000.0, 8000, 4, 2);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer[0], buffer[1]);
        assert_eq!(buffer[2], buffer[3]);
        assert!((buffer[2] - (TAU / 8.0).sin()).abs() < 1e-6);
    }
}
