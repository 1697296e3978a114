//! Presets on disk feeding the factory

use fxgraph_core::domain::config::PresetManager;
use fxgraph_core::domain::{
    AudioError, AudioFormat, ChainConfig, ChannelCount, Effect, EffectFactory, EffectKind,
    EffectSpec, FilterMode, NodeId,
};
use fxgraph_tests::{impulse, max_difference};
use tempfile::TempDir;

fn format() -> AudioFormat {
    AudioFormat::new(8000, ChannelCount::Mono, 256)
}

#[tokio::test]
async fn test_default_preset_builds_every_effect() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("default.toml");

    ChainConfig::factory_default().save_to_file(&path).await.unwrap();
    let loaded = ChainConfig::load_from_file(&path).await.unwrap();

    let mut factory = EffectFactory::new(loaded.format).with_seed(3);
    let graph = factory.build_chain(&loaded).unwrap();

    let kinds: Vec<EffectKind> = graph.iter().map(|(_, node)| node.kind()).collect();
    assert_eq!(kinds, EffectKind::ALL.to_vec());
}

#[tokio::test]
async fn test_saved_chain_renders_identically() {
    let dir = TempDir::new().unwrap();
    let manager = PresetManager::new(dir.path().to_path_buf());

    let config = ChainConfig {
        format: format(),
        effects: vec![
            EffectSpec::new("hp", "filter")
                .with_mode("highpass")
                .with_param("frequency", 150.0),
            EffectSpec::new("space", "reverb").with_param("room_size", 0.3),
            EffectSpec::new("glue", "compressor").with_param("ratio", 4.0),
        ],
    };
    manager.save_preset("vocal", &config).await.unwrap();
    assert!(manager.preset_exists("vocal").await);

    let loaded = manager.load_preset("vocal").await.unwrap();
    assert_eq!(loaded, config);

    let render = |config: &ChainConfig| {
        let mut graph = EffectFactory::new(format())
            .with_seed(8)
            .build_chain(config)
            .unwrap();
        let mut buffer = impulse(4096, 1);
        for chunk in buffer.chunks_mut(256) {
            graph.process(chunk);
        }
        buffer
    };
    assert_eq!(max_difference(&render(&config), &render(&loaded)), 0.0);
}

#[tokio::test]
async fn test_handwritten_preset_is_clamped_and_tolerant() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loud.toml");
    tokio::fs::write(
        &path,
        r#"
            [format]
            sample_rate = 8000
            channels = "mono"
            buffer_size = 256

            [[effect]]
            id = "fuzz"
            type = "distortion"
            params = { amount = 150.0, sparkle = 2.0 }

            [[effect]]
            id = "sweep"
            type = "filter"
            mode = "wobble"

            [[effect]]
            id = "echo"
            type = "delay"
            enabled = false
            params = { feedback = 3.0 }
        "#,
    )
    .await
    .unwrap();

    let config = ChainConfig::load_from_file(&path).await.unwrap();
    let graph = EffectFactory::new(format()).build_chain(&config).unwrap();

    let fuzz = graph.get_node(&NodeId::new("fuzz")).unwrap();
    assert_eq!(fuzz.params().get("amount"), Some(100.0));
    assert_eq!(fuzz.params().get("sparkle"), None);

    let sweep = graph.get_node(&NodeId::new("sweep")).unwrap();
    assert_eq!(sweep.mode(), Some(FilterMode::Lowpass));

    let echo = graph.get_node(&NodeId::new("echo")).unwrap();
    assert!(!echo.is_enabled());
    assert_eq!(echo.params().get("feedback"), Some(0.95));
}

#[tokio::test]
async fn test_preset_with_unknown_effect_fails_to_build() {
    let dir = TempDir::new().unwrap();
    let manager = PresetManager::new(dir.path().to_path_buf());
    let config = ChainConfig {
        format: format(),
        effects: vec![EffectSpec::new("wah", "wah-wah")],
    };
    manager.save_preset("odd", &config).await.unwrap();

    let loaded = manager.load_preset("odd").await.unwrap();
    let result = EffectFactory::new(format()).build_chain(&loaded);
    assert!(matches!(result, Err(AudioError::UnknownEffect(tag)) if tag == "wah-wah"));
}

#[tokio::test]
async fn test_missing_preset() {
    let dir = TempDir::new().unwrap();
    let manager = PresetManager::new(dir.path().to_path_buf());
    assert!(!manager.preset_exists("nothing").await);
    assert!(matches!(
        manager.load_preset("nothing").await,
        Err(AudioError::InvalidConfiguration(_))
    ));
}
