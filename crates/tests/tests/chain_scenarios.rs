//! End-to-end behaviour of chains built through the factory
//!
//! These tests drive `SignalGraph` directly from one thread, the way a host
//! callback without a separate control thread would.

use fxgraph_core::domain::generator::{
    decay_envelope, distortion_curve, impulse_response, seeded_noise, soft_clip,
};
use fxgraph_core::domain::{
    AudioFormat, ChannelCount, Effect, EffectFactory, EffectKind, EffectNode, FilterMode, NodeId,
    SignalGraph,
};
use fxgraph_tests::{impulse, max_difference, noise, peak, sine};
use std::collections::BTreeMap;

const SAMPLE_RATE: u32 = 8000;

fn format() -> AudioFormat {
    AudioFormat::new(SAMPLE_RATE, ChannelCount::Stereo, 256)
}

fn factory() -> EffectFactory {
    EffectFactory::new(format()).with_seed(11)
}

fn node(tag: &str, params: &[(&str, f32)]) -> EffectNode {
    let params: BTreeMap<String, f32> = params
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect();
    factory().create(tag, &params).unwrap()
}

fn single(tag: &str, params: &[(&str, f32)]) -> SignalGraph {
    let mut graph = SignalGraph::new();
    graph.push(NodeId::new(tag), node(tag, params)).unwrap();
    graph
}

/// Run `input` through `graph` in format-sized buffers
fn render(graph: &mut SignalGraph, input: &[f32]) -> Vec<f32> {
    let mut output = input.to_vec();
    for block in output.chunks_mut(format().samples_per_buffer()) {
        graph.process(block);
    }
    output
}

// ============================================================================
// PARAMETER CLAMPING
// ============================================================================

#[test]
fn test_every_parameter_clamps_to_its_range() {
    for kind in EffectKind::ALL {
        let mut node = node(kind.as_str(), &[]);
        let specs: Vec<_> = node.params().specs().collect();

        for spec in specs {
            let below = node.set_parameter(spec.name, spec.min - 1000.0);
            assert_eq!(below, Some(spec.min), "{}.{} below min", kind, spec.name);

            let above = node.set_parameter(spec.name, spec.max + 1000.0);
            assert_eq!(above, Some(spec.max), "{}.{} above max", kind, spec.name);

            let inside = spec.min + (spec.max - spec.min) * 0.5;
            assert_eq!(node.set_parameter(spec.name, inside), Some(inside));
            assert_eq!(node.params().get(spec.name), Some(inside));
        }
    }
}

#[test]
fn test_unknown_parameter_is_not_stored() {
    let mut node = node("compressor", &[]);
    assert_eq!(node.set_parameter("makeup", 6.0), None);
    assert!(!node.params().contains("makeup"));
}

#[test]
fn test_nan_leaves_value_unchanged() {
    let mut node = node("delay", &[("mix", 0.4)]);
    assert_eq!(node.set_parameter("mix", f32::NAN), Some(0.4));
}

#[test]
fn test_delay_feedback_stays_below_unity() {
    let mut node = node("delay", &[]);
    for raw in [0.95, 0.99, 1.0, 1.5, 1000.0, f32::MAX, f32::INFINITY] {
        let stored = node.set_parameter("feedback", raw).unwrap();
        assert!(stored < 1.0, "feedback {} stored as {}", raw, stored);
        assert_eq!(stored, 0.95);
    }
}

// ============================================================================
// BYPASS
// ============================================================================

#[test]
fn test_disabled_single_node_is_exact_passthrough() {
    let input = noise(3, 4096, 0.8);

    for kind in EffectKind::ALL {
        let mut graph = single(kind.as_str(), &[]);
        graph.disable(&NodeId::new(kind.as_str())).unwrap();

        let output = render(&mut graph, &input);
        assert_eq!(output, input, "{} altered the signal while disabled", kind);
    }
}

#[test]
fn test_disabled_delay_scenario() {
    let mut graph = single("delay", &[("delay_time", 0.3), ("feedback", 0.3)]);
    graph.disable(&NodeId::new("delay")).unwrap();

    let input = sine(440.0, SAMPLE_RATE, 4000, 2);
    assert_eq!(render(&mut graph, &input), input);
}

#[test]
fn test_reenabled_node_processes_again() {
    let mut graph = single("distortion", &[("amount", 100.0)]);
    let id = NodeId::new("distortion");
    let input = sine(220.0, SAMPLE_RATE, 512, 2);

    graph.disable(&id).unwrap();
    assert_eq!(render(&mut graph, &input), input);

    graph.enable(&id).unwrap();
    assert!(max_difference(&render(&mut graph, &input), &input) > 1e-3);
}

// ============================================================================
// PER-EFFECT SCENARIOS
// ============================================================================

#[test]
fn test_flat_eq_is_identity() {
    let mut graph = single("eq", &[]);
    let input = sine(440.0, SAMPLE_RATE, 4096, 2);
    let output = render(&mut graph, &input);
    assert!(max_difference(&output, &input) < 1e-4);
}

#[test]
fn test_distortion_curve_is_odd() {
    for amount in [0.0, 25.0, 50.0, 100.0] {
        let k = amount / 100.0;
        let shaper = distortion_curve(amount);
        for i in 0..=100 {
            let x = i as f32 / 100.0;
            assert_eq!(soft_clip(-x, k), -soft_clip(x, k));
            assert!((shaper.shape(-x) + shaper.shape(x)).abs() < 1e-3);
        }
    }
}

#[test]
fn test_distortion_amount_above_max() {
    let mut node = node("distortion", &[]);
    assert_eq!(node.set_parameter("amount", 150.0), Some(100.0));

    let EffectNode::Distortion(distortion) = &node else {
        panic!("expected a distortion node");
    };
    let shaper = distortion.shaper();
    assert_eq!(shaper.amount(), 100.0);
    assert_eq!(shaper.input_gain(), 1.5);
    assert_eq!(shaper.curve(), distortion_curve(100.0).curve());
}

#[test]
fn test_impulse_response_decays() {
    let length = SAMPLE_RATE as usize * 2;

    for room_size in [0.0, 0.25, 0.5, 0.75, 1.0] {
        for i in 1..length {
            assert!(decay_envelope(i, length, room_size) <= decay_envelope(i - 1, length, room_size));
        }

        let ir = impulse_response(SAMPLE_RATE, room_size, &mut seeded_noise(5));
        assert_eq!(ir.len(), length);
        for channel in 0..2 {
            for (i, sample) in ir.channel(channel).iter().enumerate() {
                assert!(sample.abs() <= decay_envelope(i, length, room_size) + 1e-6);
            }
        }
    }

    // Average energy falls off across the tail
    for room_size in [0.5, 1.0] {
        let ir = impulse_response(SAMPLE_RATE, room_size, &mut seeded_noise(6));
        let quarter = length / 4;
        let mean = |s: &[f32]| s.iter().map(|x| x.abs()).sum::<f32>() / s.len() as f32;
        let head = mean(&ir.channel(0)[..quarter]);
        let tail = mean(&ir.channel(0)[length - quarter..]);
        assert!(head > tail * 2.0, "room {}: head {} tail {}", room_size, head, tail);
    }
}

#[test]
fn test_lowpass_filter_silence_in_silence_out() {
    let mut graph = single("filter", &[("frequency", 1000.0), ("q", 1.0)]);
    let id = NodeId::new("filter");
    assert!(graph.get_node_mut(&id).unwrap().set_mode("lowpass"));
    assert_eq!(graph.get_node(&id).unwrap().mode(), Some(FilterMode::Lowpass));

    let input = vec![0.0_f32; 4096];
    assert_eq!(render(&mut graph, &input), input);
}

#[test]
fn test_unrecognised_modes_are_ignored() {
    let mut filter = node("filter", &[]);
    assert!(filter.set_mode("bandpass"));
    assert!(!filter.set_mode("wobble"));
    assert_eq!(filter.mode(), Some(FilterMode::Bandpass));

    let mut eq = node("eq", &[]);
    assert!(!eq.set_mode("lowpass"));
    assert_eq!(eq.mode(), None);
}

#[test]
fn test_delay_feedback_tail_decays() {
    let mut graph = single(
        "delay",
        &[("delay_time", 0.01), ("feedback", 5.0), ("mix", 1.0)],
    );
    let output = render(&mut graph, &impulse(SAMPLE_RATE as usize * 2, 2));

    let block = format().samples_per_buffer();
    let early = peak(&output[..block]);
    let late = peak(&output[output.len() - block..]);
    assert!(early > 0.9);
    assert!(late < 0.01, "tail still at {}", late);
}

#[test]
fn test_chorus_oscillator_survives_reset() {
    let mut graph = single("chorus", &[("rate", 2.0)]);
    let id = NodeId::new("chorus");
    render(&mut graph, &sine(330.0, SAMPLE_RATE, 1000, 2));

    let phase_of = |graph: &SignalGraph| match graph.get_node(&id) {
        Some(EffectNode::Chorus(chorus)) => chorus.phase(),
        other => panic!("unexpected node {:?}", other),
    };

    let before = phase_of(&graph);
    assert!(before > 0.0);
    graph.reset();
    assert_eq!(phase_of(&graph), before);
}

#[test]
fn test_reverb_room_size_republishes_kernel() {
    let mut node = node("reverb", &[]);
    let EffectNode::Reverb(reverb) = &mut node else {
        panic!("expected a reverb node");
    };
    let handle = reverb.kernel_handle();
    assert_eq!(handle.load().room_size(), 0.5);

    reverb.set_room_size(3.0);
    assert_eq!(handle.load().room_size(), 1.0);
    assert_eq!(reverb.room_size(), 1.0);
}

#[test]
fn test_reverb_tail_follows_latency() {
    let mut graph = single("reverb", &[]);
    let latency = graph.latency_samples();
    assert!(latency > 0);

    let output = render(&mut graph, &impulse(SAMPLE_RATE as usize, 2));
    // Nothing arrives before the convolver's block delay
    assert!(peak(&output[..latency * 2]) < 1e-6);
    assert!(peak(&output[latency * 2..]) > 0.0);
    assert!(output.iter().all(|s| s.is_finite()));
}

// ============================================================================
// CHAIN ORDER
// ============================================================================

fn eq_then_compressor() -> SignalGraph {
    let mut graph = SignalGraph::new();
    graph
        .push(
            NodeId::new("eq"),
            node("eq", &[("low_gain", 18.0), ("high_gain", -12.0)]),
        )
        .unwrap();
    graph
        .push(
            NodeId::new("comp"),
            node("compressor", &[("threshold", -30.0), ("ratio", 8.0)]),
        )
        .unwrap();
    graph
}

fn program_material() -> Vec<f32> {
    let low = sine(100.0, SAMPLE_RATE, 4000, 2);
    let high = sine(2500.0, SAMPLE_RATE, 4000, 2);
    low.iter().zip(&high).map(|(a, b)| 0.3 * a + 0.3 * b).collect()
}

#[test]
fn test_reorder_changes_output() {
    let input = program_material();

    let mut original = eq_then_compressor();
    let before = render(&mut original, &input);

    let mut reordered = eq_then_compressor();
    reordered
        .reorder(&[NodeId::new("comp"), NodeId::new("eq")])
        .unwrap();
    let ids: Vec<&str> = reordered.ids().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["comp", "eq"]);

    let after = render(&mut reordered, &input);
    assert!(max_difference(&before, &after) > 1e-3);
}

#[test]
fn test_reordered_chain_matches_chain_built_in_that_order() {
    let input = program_material();

    let mut reordered = eq_then_compressor();
    reordered
        .reorder(&[NodeId::new("comp"), NodeId::new("eq")])
        .unwrap();

    let mut direct = SignalGraph::new();
    direct
        .push(
            NodeId::new("comp"),
            node("compressor", &[("threshold", -30.0), ("ratio", 8.0)]),
        )
        .unwrap();
    direct
        .push(
            NodeId::new("eq"),
            node("eq", &[("low_gain", 18.0), ("high_gain", -12.0)]),
        )
        .unwrap();

    assert_eq!(render(&mut reordered, &input), render(&mut direct, &input));
}
