//! Effect construction by type tag

use crate::domain::audio::{AudioError, AudioFormat, Result};
use crate::domain::config::{ChainConfig, EffectSpec};
use crate::domain::dsp::{
    Chorus, Compressor, Delay, Distortion, Effect, EffectKind, EffectNode, Equalizer, Filter,
    Reverb,
};
use crate::domain::generator::{entropy_noise, seeded_noise, NoiseSource};
use crate::domain::graph::{NodeId, SignalGraph};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Builds a node at default settings for the given format
pub type Constructor = fn(&AudioFormat, NoiseSource) -> EffectNode;

/// Registry of effect constructors keyed by type tag
///
/// Owned by whatever assembles a chain. Every node it builds shares the
/// factory's audio format.
pub struct EffectFactory {
    format: AudioFormat,
    constructors: HashMap<String, Constructor>,
    seed: Option<u64>,
    built: u64,
}

impl EffectFactory {
    /// Factory with every built-in effect registered under its tag
    pub fn new(format: AudioFormat) -> Self {
        let mut factory = Self {
            format,
            constructors: HashMap::new(),
            seed: None,
            built: 0,
        };

        for kind in EffectKind::ALL {
            factory.register(kind.as_str(), builtin(kind));
        }
        factory.register("equalizer", builtin(EffectKind::Equalizer));
        factory
    }

    /// Derive reverb noise from `seed` instead of OS entropy
    ///
    /// Each node built gets its own stream, so two reverbs from one seeded
    /// factory still differ, but rebuilding the same chain is repeatable.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Register (or replace) the constructor for a tag
    pub fn register(&mut self, tag: &str, constructor: Constructor) {
        self.constructors.insert(tag.to_ascii_lowercase(), constructor);
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(&tag.to_ascii_lowercase())
    }

    /// Fresh noise source for a reverb, honoring the seed if one was set
    pub fn noise(&mut self) -> NoiseSource {
        self.built += 1;
        match self.seed {
            Some(seed) => seeded_noise(seed.wrapping_add(self.built)),
            None => entropy_noise(),
        }
    }

    /// Build a node by tag and apply initial parameters
    ///
    /// Parameters are clamped like any other setter. Names the effect does
    /// not have are skipped with a warning.
    pub fn create(&mut self, tag: &str, params: &BTreeMap<String, f32>) -> Result<EffectNode> {
        let constructor = *self
            .constructors
            .get(&tag.to_ascii_lowercase())
            .ok_or_else(|| AudioError::UnknownEffect(tag.to_string()))?;

        let noise = self.noise();
        let mut node = constructor(&self.format, noise);
        for (name, &value) in params {
            if node.set_parameter(name, value).is_none() {
                warn!("{} has no parameter {:?}, ignoring", node.kind(), name);
            }
        }

        debug!("Created {} node", node.kind());
        Ok(node)
    }

    /// Build a node from a preset entry, including its mode and enabled flag
    pub fn build(&mut self, spec: &EffectSpec) -> Result<EffectNode> {
        let mut node = self.create(&spec.effect_type, &spec.params)?;

        if let Some(mode) = &spec.mode {
            if !node.set_mode(mode) {
                warn!("{} does not support mode {:?}, ignoring", spec.id, mode);
            }
        }
        if !spec.enabled {
            node.disable();
        }
        Ok(node)
    }

    /// Build a whole chain in preset order
    pub fn build_chain(&mut self, config: &ChainConfig) -> Result<SignalGraph> {
        if config.format != self.format {
            return Err(AudioError::InvalidConfiguration(format!(
                "preset format {:?} does not match factory format {:?}",
                config.format, self.format
            )));
        }
        config.validate()?;

        let mut graph = SignalGraph::new();
        for spec in &config.effects {
            let node = self.build(spec)?;
            graph.push(NodeId::new(spec.id.as_str()), node)?;
        }

        debug!(nodes = graph.len(), "Chain built");
        Ok(graph)
    }
}

fn builtin(kind: EffectKind) -> Constructor {
    match kind {
        EffectKind::Reverb => |format: &AudioFormat, noise: NoiseSource| {
            EffectNode::Reverb(Reverb::new(format, noise))
        },
        EffectKind::Delay => |format: &AudioFormat, _: NoiseSource| {
            EffectNode::Delay(Delay::new(format))
        },
        EffectKind::Equalizer => |format: &AudioFormat, _: NoiseSource| {
            EffectNode::Equalizer(Equalizer::new(format))
        },
        EffectKind::Compressor => |format: &AudioFormat, _: NoiseSource| {
            EffectNode::Compressor(Compressor::new(format))
        },
        EffectKind::Distortion => |format: &AudioFormat, _: NoiseSource| {
            EffectNode::Distortion(Distortion::new(format))
        },
        EffectKind::Filter => |format: &AudioFormat, _: NoiseSource| {
            EffectNode::Filter(Filter::new(format))
        },
        EffectKind::Chorus => |format: &AudioFormat, _: NoiseSource| {
            EffectNode::Chorus(Chorus::new(format))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audio::ChannelCount;
    use crate::domain::dsp::FilterMode;

    fn factory() -> EffectFactory {
        EffectFactory::new(AudioFormat::new(8000, ChannelCount::Stereo, 128)).with_seed(42)
    }

    #[test]
    fn test_every_kind_registered() {
        let mut factory = factory();
        for kind in EffectKind::ALL {
            let node = factory.create(kind.as_str(), &BTreeMap::new()).unwrap();
            assert_eq!(node.kind(), kind);
            assert!(node.is_enabled());
        }
        assert!(factory.is_registered("Equalizer"));
    }

    #[test]
    fn test_defaults_applied() {
        let mut factory = factory();
        let node = factory.create("delay", &BTreeMap::new()).unwrap();
        assert_eq!(node.params().get("delay_time"), Some(0.3));
        assert_eq!(node.params().get("feedback"), Some(0.3));
    }

    #[test]
    fn test_unknown_tag() {
        let mut factory = factory();
        let result = factory.create("phaser", &BTreeMap::new());
        assert!(matches!(result, Err(AudioError::UnknownEffect(tag)) if tag == "phaser"));
    }

    #[test]
    fn test_initial_params_clamped() {
        let mut factory = factory();
        let params = BTreeMap::from([
            ("amount".to_string(), 150.0),
            ("sparkle".to_string(), 1.0),
        ]);
        let node = factory.create("distortion", &params).unwrap();
        assert_eq!(node.params().get("amount"), Some(100.0));
        assert_eq!(node.params().get("sparkle"), None);
    }

    #[test]
    fn test_build_spec_with_mode() {
        let mut factory = factory();
        let spec = EffectSpec::new("hp", "filter").with_mode("highpass").disabled();
        let node = factory.build(&spec).unwrap();
        assert_eq!(node.mode(), Some(FilterMode::Highpass));
        assert!(!node.is_enabled());
    }

    #[test]
    fn test_register_custom_tag() {
        let mut factory = factory();
        factory.register("echo", |format: &AudioFormat, _: NoiseSource| {
            let mut delay = Delay::new(format);
            delay.set_feedback(0.6);
            EffectNode::Delay(delay)
        });

        let node = factory.create("ECHO", &BTreeMap::new()).unwrap();
        assert_eq!(node.params().get("feedback"), Some(0.6));
        assert!(factory.tags().contains(&"echo"));
    }

    #[test]
    fn test_build_chain_order() {
        let mut factory = factory();
        let config = ChainConfig {
            format: factory.format(),
            effects: vec![
                EffectSpec::new("one", "compressor"),
                EffectSpec::new("two", "eq"),
                EffectSpec::new("three", "chorus"),
            ],
        };

        let graph = factory.build_chain(&config).unwrap();
        let ids: Vec<&str> = graph.ids().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_build_chain_format_mismatch() {
        let mut factory = factory();
        let config = ChainConfig::factory_default();
        assert!(matches!(
            factory.build_chain(&config),
            Err(AudioError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_build_chain_unknown_effect() {
        let mut factory = factory();
        let config = ChainConfig {
            format: factory.format(),
            effects: vec![EffectSpec::new("a", "delay"), EffectSpec::new("b", "wah")],
        };
        assert!(matches!(
            factory.build_chain(&config),
            Err(AudioError::UnknownEffect(_))
        ));
    }

    #[test]
    fn test_seeded_factories_repeatable() {
        let signal: Vec<f32> = (0..4096).map(|i| if i == 0 { 1.0 } else { 0.0 }).collect();

        let render = || {
            let mut node = factory().create("reverb", &BTreeMap::new()).unwrap();
            let mut out = signal.clone();
            node.process(&mut out);
            out
        };

        assert_eq!(render(), render());
    }
}
