//! fxgraph CLI: render a test signal through an effect chain

mod signal;

use anyhow::Context;
use clap::Parser;
use fxgraph_core::domain::generator::noise_stream;
use fxgraph_core::domain::{ChainConfig, EffectFactory, EffectSpec, SignalGraph};
use fxgraph_infra::{channel_with_noise, ChainRenderer};
use serde::Serialize;
use signal::{Signal, SignalSource};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Commands the engine can hold between two buffers
const COMMAND_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "fxgraph")]
#[command(about = "Render a test signal through an audio effect chain", long_about = None)]
struct Cli {
    /// Chain preset to load (defaults to one of every effect)
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Length of the rendered signal
    #[arg(short, long, default_value_t = 2.0)]
    seconds: f32,

    /// Test signal fed into the chain
    #[arg(long, value_enum, default_value_t = Signal::Sine)]
    signal: Signal,

    /// Seed for reverb impulse responses and the noise signal
    #[arg(long)]
    seed: Option<u64>,

    /// Write the default preset to this file and exit
    #[arg(long, value_name = "FILE")]
    write_default: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Output levels over the whole render
#[derive(Debug, Default, Serialize)]
struct Levels {
    peak: f32,
    rms: f32,
}

#[derive(Serialize)]
struct Report {
    sample_rate: u32,
    channels: usize,
    signal: &'static str,
    seconds: f32,
    buffers: u64,
    latency_samples: usize,
    levels: Levels,
    nodes: Vec<EffectSpec>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = &cli.write_default {
        ChainConfig::factory_default()
            .save_to_file(path)
            .await
            .with_context(|| format!("writing default preset to {}", path.display()))?;
        info!(path = %path.display(), "Default preset written");
        return Ok(());
    }

    let config = match &cli.preset {
        Some(path) => ChainConfig::load_from_file(path)
            .await
            .with_context(|| format!("loading preset {}", path.display()))?,
        None => ChainConfig::factory_default(),
    };

    let format = config.format;
    let mut factory = EffectFactory::new(format);
    if let Some(seed) = cli.seed {
        factory = factory.with_seed(seed);
    }
    let graph = factory.build_chain(&config).context("building effect chain")?;
    info!(nodes = graph.len(), "Chain ready");

    let (controller, renderer) =
        channel_with_noise(graph, format, COMMAND_CAPACITY, noise_stream(cli.seed));

    let frames = (cli.seconds.max(0.0) * format.sample_rate.as_f32()).round() as usize;
    let source = SignalSource::new(
        cli.signal,
        format.sample_rate.hz(),
        format.channels.count(),
        cli.seed.unwrap_or(0),
    );
    let block = format.samples_per_buffer();
    let total = frames * format.channels.count();

    let (graph, levels) =
        tokio::task::spawn_blocking(move || render(renderer, source, block, total))
            .await
            .context("render thread panicked")?;

    let report = Report {
        sample_rate: format.sample_rate.hz(),
        channels: format.channels.count(),
        signal: cli.signal.as_str(),
        seconds: cli.seconds,
        buffers: controller.buffers_processed(),
        latency_samples: graph.latency_samples(),
        levels,
        nodes: controller.snapshot().effects,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Push `total` samples through the renderer in `block`-sized buffers
fn render(
    mut renderer: ChainRenderer,
    mut source: SignalSource,
    block: usize,
    total: usize,
) -> (SignalGraph, Levels) {
    let mut buffer = vec![0.0_f32; block.max(1)];
    let mut peak = 0.0_f32;
    let mut energy = 0.0_f64;
    let mut rendered = 0;

    while rendered < total {
        let len = buffer.len().min(total - rendered);
        let chunk = &mut buffer[..len];
        source.fill(chunk);
        renderer.process(chunk);

        for &sample in chunk.iter() {
            peak = peak.max(sample.abs());
            energy += f64::from(sample) * f64::from(sample);
        }
        rendered += len;
    }

    let rms = if total > 0 {
        (energy / total as f64).sqrt() as f32
    } else {
        0.0
    };
    debug!(samples = rendered, "Render finished");
    (renderer.into_graph(), Levels { peak, rms })
}

fn to_dbfs(level: f32) -> f32 {
    if level > 0.0 {
        20.0 * level.log10()
    } else {
        f32::NEG_INFINITY
    }
}

fn print_report(report: &Report) {
    println!(
        "Chain: {} nodes, {} Hz, {} ch, latency {} samples",
        report.nodes.len(),
        report.sample_rate,
        report.channels,
        report.latency_samples
    );

    for node in &report.nodes {
        let state = if node.enabled { "on " } else { "off" };
        match &node.mode {
            Some(mode) => println!("  [{}] {} ({}, {})", state, node.id, node.effect_type, mode),
            None => println!("  [{}] {} ({})", state, node.id, node.effect_type),
        }
        for (name, value) in &node.params {
            println!("        {:<12} {:>10.4}", name, value);
        }
    }

    println!(
        "Rendered {:.2}s of {} in {} buffers",
        report.seconds, report.signal, report.buffers
    );
    println!(
        "Output: peak {:.4} ({:.1} dBFS), rms {:.4} ({:.1} dBFS)",
        report.levels.peak,
        to_dbfs(report.levels.peak),
        report.levels.rms,
        to_dbfs(report.levels.rms)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxgraph_core::domain::{AudioFormat, ChannelCount};

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "fxgraph", "--seconds", "0.5", "--signal", "impulse", "--json", "--seed", "3",
        ]);
        assert_eq!(cli.seconds, 0.5);
        assert_eq!(cli.signal, Signal::Impulse);
        assert!(cli.json);
        assert_eq!(cli.seed, Some(3));
        assert!(cli.preset.is_none());
    }

    #[test]
    fn test_render_empty_chain_reports_input_levels() {
        let format = AudioFormat::new(8000, ChannelCount::Mono, 64);
        let (controller, renderer) =
            channel_with_noise(SignalGraph::new(), format, 4, noise_stream(None));
        let source = SignalSource::new(Signal::Impulse, 8000, 1, 0);

        let (graph, levels) = render(renderer, source, format.samples_per_buffer(), 1000);
        assert!(graph.is_empty());
        assert_eq!(levels.peak, 1.0);
        assert!((levels.rms - (1.0_f32 / 1000.0).sqrt()).abs() < 1e-6);
        // 1000 samples in 64-sample buffers
        assert_eq!(controller.buffers_processed(), 16);
    }

    #[test]
    fn test_to_dbfs() {
        assert_eq!(to_dbfs(1.0), 0.0);
        assert!((to_dbfs(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(to_dbfs(0.0), f32::NEG_INFINITY);
    }
}
