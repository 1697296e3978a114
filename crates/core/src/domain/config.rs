//! Chain presets
//!
//! This module provides:
//! - The serializable description of a chain (format plus ordered effects)
//! - Preset files in TOML, loaded and saved asynchronously
//! - A preset manager over a directory of such files

use crate::domain::audio::{AudioError, AudioFormat, Result};
use crate::domain::dsp::{Effect, EffectKind};
use crate::domain::graph::SignalGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

fn enabled_by_default() -> bool {
    true
}

/// One effect of a preset: its type tag and initial parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    /// Node id, unique within the chain
    pub id: String,

    /// Factory tag, e.g. "reverb" or "eq"
    #[serde(rename = "type")]
    pub effect_type: String,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    /// Filter mode name; ignored by other effects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Initial parameter values, clamped when applied
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

impl EffectSpec {
    pub fn new(id: impl Into<String>, effect_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            effect_type: effect_type.into(),
            enabled: true,
            mode: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f32) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Complete chain description
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub format: AudioFormat,

    /// Effects in processing order
    #[serde(default, rename = "effect")]
    pub effects: Vec<EffectSpec>,
}

impl ChainConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading chain preset");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(effects = config.effects.len(), "Chain preset loaded");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving chain preset");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Chain preset saved");
        Ok(())
    }

    /// Check the format and that node ids are unique
    ///
    /// Effect types and parameter names are checked when the chain is built.
    pub fn validate(&self) -> Result<()> {
        self.format.validate()?;

        let mut seen = HashSet::new();
        for spec in &self.effects {
            if !seen.insert(spec.id.as_str()) {
                return Err(AudioError::DuplicateNode(spec.id.clone()));
            }
        }
        Ok(())
    }

    /// One instance of every built-in effect, at default settings
    pub fn factory_default() -> Self {
        let effects = EffectKind::ALL
            .iter()
            .map(|kind| EffectSpec::new(kind.as_str(), kind.as_str()))
            .collect();

        Self {
            format: AudioFormat::default(),
            effects,
        }
    }

    /// Describe the current state of a running graph
    pub fn capture(format: AudioFormat, graph: &SignalGraph) -> Self {
        let effects = graph
            .iter()
            .map(|(id, node)| EffectSpec {
                id: id.to_string(),
                effect_type: node.kind().as_str().to_string(),
                enabled: node.is_enabled(),
                mode: node.mode().map(|mode| mode.as_str().to_string()),
                params: node.params().snapshot(),
            })
            .collect();

        Self { format, effects }
    }
}

/// Preset manager over a directory of `.toml` chain files
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "toml") {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<ChainConfig> {
        let path = self.path_for(name);

        if !fs::try_exists(&path).await? {
            return Err(AudioError::InvalidConfiguration(format!(
                "preset not found: {}",
                name
            )));
        }

        ChainConfig::load_from_file(&path).await
    }

    #[instrument(skip(self, config))]
    pub async fn save_preset(&self, name: &str, config: &ChainConfig) -> Result<()> {
        config.save_to_file(self.path_for(name)).await
    }

    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path_for(name)).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        fs::try_exists(self.path_for(name)).await.unwrap_or(false)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.preset_dir.join(format!("{}.toml", name))
    }
}
