//! Control and render actors on separate threads

use fxgraph_core::domain::generator::noise_stream;
use fxgraph_core::domain::{
    AudioFormat, ChainConfig, ChannelCount, Effect, EffectFactory, EffectNode, EffectSpec, NodeId,
};
use fxgraph_infra::{channel_with_noise, ChainController, ChainRenderer, EngineError};
use fxgraph_tests::{impulse, max_difference, noise, sine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

fn format() -> AudioFormat {
    AudioFormat::new(8000, ChannelCount::Stereo, 128)
}

fn preset() -> ChainConfig {
    ChainConfig {
        format: format(),
        effects: vec![
            EffectSpec::new("tone", "filter").with_param("frequency", 2000.0),
            EffectSpec::new("drive", "distortion").with_param("amount", 20.0),
            EffectSpec::new("echo", "delay").with_param("delay_time", 0.05),
        ],
    }
}

fn engine(config: &ChainConfig) -> (ChainController, ChainRenderer) {
    let graph = EffectFactory::new(format())
        .with_seed(1)
        .build_chain(config)
        .unwrap();
    channel_with_noise(graph, format(), 16, noise_stream(Some(1)))
}

/// Render noise until `stop` is raised, then hand the graph back
fn spawn_renderer(
    mut renderer: ChainRenderer,
    stop: Arc<AtomicBool>,
) -> JoinHandle<fxgraph_core::domain::SignalGraph> {
    thread::spawn(move || {
        let input = noise(2, format().samples_per_buffer(), 0.5);
        let mut buffer = input.clone();
        while !stop.load(Ordering::Acquire) {
            buffer.copy_from_slice(&input);
            renderer.process(&mut buffer);
            assert!(buffer.iter().all(|s| s.is_finite()));
            thread::yield_now();
        }
        renderer.into_graph()
    })
}

fn wait_for_buffers(controller: &ChainController, count: u64) {
    let target = controller.buffers_processed() + count;
    while controller.buffers_processed() < target {
        thread::yield_now();
    }
}

#[test]
fn test_edits_while_rendering() {
    let (mut controller, renderer) = engine(&preset());
    let stop = Arc::new(AtomicBool::new(false));
    let render = spawn_renderer(renderer, Arc::clone(&stop));

    let factory_node = EffectFactory::new(format())
        .with_seed(2)
        .create("reverb", &Default::default())
        .unwrap();

    wait_for_buffers(&controller, 2);
    controller.insert(NodeId::new("room"), factory_node, 1).unwrap();
    controller
        .set_parameter(&NodeId::new("drive"), "amount", 250.0)
        .unwrap();
    wait_for_buffers(&controller, 2);

    controller
        .reorder(&[
            NodeId::new("echo"),
            NodeId::new("room"),
            NodeId::new("drive"),
            NodeId::new("tone"),
        ])
        .unwrap();
    controller.disable(&NodeId::new("room")).unwrap();
    controller.remove(&NodeId::new("tone")).unwrap();
    wait_for_buffers(&controller, 2);

    stop.store(true, Ordering::Release);
    let graph = render.join().unwrap();
    controller.collect_garbage();

    let ids: Vec<&str> = graph.ids().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["echo", "room", "drive"]);
    assert!(controller.ids().eq(graph.ids()));

    assert!(!graph.get_node(&NodeId::new("room")).unwrap().is_enabled());
    let drive = graph.get_node(&NodeId::new("drive")).unwrap();
    assert_eq!(drive.params().get("amount"), Some(100.0));
}

#[test]
fn test_regenerated_curve_reaches_renderer() {
    let (mut controller, renderer) = engine(&preset());
    let stop = Arc::new(AtomicBool::new(false));
    let render = spawn_renderer(renderer, Arc::clone(&stop));

    controller
        .set_parameter(&NodeId::new("drive"), "amount", 90.0)
        .unwrap();
    wait_for_buffers(&controller, 2);

    stop.store(true, Ordering::Release);
    let graph = render.join().unwrap();

    match graph.get_node(&NodeId::new("drive")) {
        Some(EffectNode::Distortion(distortion)) => {
            assert_eq!(distortion.amount(), 90.0);
            assert_eq!(distortion.shaper().amount(), 90.0);
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn test_engine_matches_direct_processing() {
    let config = preset();
    let input = sine(300.0, 8000, 2048, 2);
    let block = format().samples_per_buffer();

    let mut direct = EffectFactory::new(format())
        .with_seed(1)
        .build_chain(&config)
        .unwrap();
    let mut expected = input.clone();
    for chunk in expected.chunks_mut(block) {
        direct.process(chunk);
    }

    let (_controller, mut renderer) = engine(&config);
    let mut actual = input.clone();
    for chunk in actual.chunks_mut(block) {
        renderer.process(chunk);
    }

    assert_eq!(max_difference(&expected, &actual), 0.0);
}

#[test]
fn test_seeded_engines_agree_after_room_edit() {
    let config = ChainConfig {
        format: format(),
        effects: vec![
            EffectSpec::new("space", "reverb").with_param("room_size", 0.4),
            EffectSpec::new("echo", "delay").with_param("delay_time", 0.05),
        ],
    };
    let input = impulse(8000, 2);
    let block = format().samples_per_buffer();

    let run = || {
        let (mut controller, mut renderer) = engine(&config);
        controller
            .set_parameter(&NodeId::new("space"), "room_size", 0.9)
            .unwrap();
        let mut output = input.clone();
        for chunk in output.chunks_mut(block) {
            renderer.process(chunk);
        }
        controller.collect_garbage();
        output
    };

    assert_eq!(max_difference(&run(), &run()), 0.0);
}

#[test]
fn test_snapshot_round_trips_through_factory() {
    let (mut controller, _renderer) = engine(&preset());
    controller
        .set_parameter(&NodeId::new("echo"), "feedback", 0.6)
        .unwrap();
    controller.set_mode(&NodeId::new("tone"), "notch").unwrap();
    controller.disable(&NodeId::new("drive")).unwrap();

    let snapshot = controller.snapshot();
    let rebuilt = EffectFactory::new(format())
        .build_chain(&snapshot)
        .unwrap();

    assert_eq!(ChainConfig::capture(format(), &rebuilt), snapshot);
}

#[test]
fn test_dropped_renderer_is_reported() {
    let (mut controller, renderer) = engine(&preset());
    drop(renderer);

    let result = controller.set_parameter(&NodeId::new("echo"), "mix", 0.1);
    assert!(matches!(result, Err(EngineError::Disconnected)));
    assert_eq!(controller.params(&NodeId::new("echo")).unwrap().get("mix"), Some(0.5));
}
