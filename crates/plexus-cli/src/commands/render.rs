//! Offline render command.

use std::path::{Path, PathBuf};

use clap::Args;
use plexus_io::{AudioBuffer, GraphPlayer, OfflineRenderer, WavSpec, read_wav, write_wav};

use super::common::{load_config, open_graph, resolve_graph};

/// Length rendered when neither `--seconds` nor `--input` gives one.
const DEFAULT_SECONDS: f64 = 5.0;

#[derive(Args)]
pub struct RenderArgs {
    /// Graph document (path or saved graph name)
    #[arg(value_name = "GRAPH")]
    graph: String,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Input WAV fed to the graph's audio input
    #[arg(short, long, value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Length in seconds (defaults to the input length, or 5)
    #[arg(long)]
    seconds: Option<f64>,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,
}

pub fn run(args: RenderArgs, config: Option<&Path>) -> anyhow::Result<()> {
    if ![16, 24, 32].contains(&args.bit_depth) {
        anyhow::bail!("unsupported bit depth {}", args.bit_depth);
    }
    let mut config = load_config(config)?;

    let input = match &args.input {
        Some(path) => {
            let (buffer, spec) = read_wav(path)?;
            println!(
                "Input: {} ({} ch, {} Hz, {} frames)",
                path.display(),
                spec.channels,
                spec.sample_rate,
                buffer.frames()
            );
            // Run the graph at the file's rate.
            config.sample_rate = spec.sample_rate;
            config.validate()?;
            Some(buffer)
        }
        None => None,
    };

    let path = resolve_graph(&args.graph)?;
    let loaded = open_graph(&path, &config)?;
    let channels = usize::from(config.device.channels);

    let frames = match (args.seconds, &input) {
        (Some(seconds), _) => seconds_to_frames(seconds, config.sample_rate)?,
        (None, Some(buffer)) => buffer.frames(),
        (None, None) => seconds_to_frames(DEFAULT_SECONDS, config.sample_rate)?,
    };
    let input = input.unwrap_or_else(|| AudioBuffer::new(channels, 0));

    let (mut player, _midi) = GraphPlayer::new(
        loaded.graph.reader(),
        config.block_size,
        config.midi_buffer_capacity,
    );
    let renderer = OfflineRenderer::new(f64::from(config.sample_rate), config.block_size, channels);
    let output = renderer.render(&mut player, &input, frames);

    write_wav(
        &args.output,
        &output,
        WavSpec {
            channels: config.device.channels,
            sample_rate: config.sample_rate,
            bits_per_sample: args.bit_depth,
        },
    )?;

    println!(
        "Rendered {} frames ({:.2}s) to {}",
        frames,
        frames as f64 / f64::from(config.sample_rate),
        args.output.display()
    );
    Ok(())
}

fn seconds_to_frames(seconds: f64, sample_rate: u32) -> anyhow::Result<usize> {
    if !seconds.is_finite() || seconds < 0.0 {
        anyhow::bail!("invalid length: {seconds} seconds");
    }
    Ok((seconds * f64::from(sample_rate)).round() as usize)
}
