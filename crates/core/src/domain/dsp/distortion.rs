//! Waveshaping distortion

use super::Effect;
use crate::domain::audio::AudioFormat;
use crate::domain::generator::{distortion_curve, DerivedBuffer, WaveShaper};
use crate::domain::params::{ranges, ParamSpec, ParameterStore};
use arc_swap::Guard;
use std::sync::Arc;
use tracing::debug;

pub(super) const AMOUNT: &str = ranges::AMOUNT.name;

static SPECS: [ParamSpec; 1] = [ranges::AMOUNT];

/// Rebuilds the transfer curve into a distortion's shared handle
#[derive(Clone)]
pub struct DistortionPublisher {
    shaper: Arc<DerivedBuffer<WaveShaper>>,
}

impl DistortionPublisher {
    /// Publish a curve for `amount`; returns the one it replaced
    pub fn rebuild(&mut self, amount: f32) -> Arc<WaveShaper> {
        let shaper = distortion_curve(amount);
        debug!(
            amount = shaper.amount(),
            input_gain = shaper.input_gain(),
            "Distortion curve regenerated"
        );
        self.shaper.publish(shaper)
    }
}

/// Input gain, soft-clipping curve, output gain
///
/// The curve and both gains are regenerated together, so the compensation
/// always matches the curve in use.
pub struct Distortion {
    bypass: bool,
    params: ParameterStore,
    publisher: DistortionPublisher,
}

impl Distortion {
    /// The curve does not depend on the sample rate or channel layout
    pub fn new(_format: &AudioFormat) -> Self {
        let params = ParameterStore::new(&SPECS);
        let shaper = distortion_curve(params.value(&ranges::AMOUNT));

        Self {
            bypass: false,
            params,
            publisher: DistortionPublisher {
                shaper: Arc::new(DerivedBuffer::new(shaper)),
            },
        }
    }

    /// Set the amount, regenerating the curve and gain compensation
    pub fn set_amount(&mut self, amount: f32) -> f32 {
        if amount.is_nan() {
            return self.amount();
        }
        let stored = self.params.set(AMOUNT, amount).unwrap_or(amount);
        self.publisher.rebuild(stored);
        stored
    }

    pub fn amount(&self) -> f32 {
        self.params.value(&ranges::AMOUNT)
    }

    /// Curve currently in use
    pub fn shaper(&self) -> Guard<Arc<WaveShaper>> {
        self.publisher.shaper.load()
    }

    pub fn shaper_handle(&self) -> Arc<DerivedBuffer<WaveShaper>> {
        Arc::clone(&self.publisher.shaper)
    }

    /// Publisher sharing this distortion's curve handle
    pub fn publisher(&self) -> DistortionPublisher {
        self.publisher.clone()
    }
}

impl Effect for Distortion {
    fn process(&mut self, buffer: &mut [f32]) {
        if self.bypass {
            return;
        }

        let shaper = self.publisher.shaper.load();
        for sample in buffer.iter_mut() {
            *sample = shaper.process_sample(*sample);
        }
    }

    fn reset(&mut self) {}

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    fn name(&self) -> &str {
        "Distortion"
    }

    fn params(&self) -> &ParameterStore {
        &self.params
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        if name == AMOUNT {
            Some(self.set_amount(value))
        } else {
            self.params.set(name, value)
        }
    }

    fn sync_parameter(&mut self, name: &str, value: f32) -> Option<f32> {
        self.params.set(name, value)
    }
}
