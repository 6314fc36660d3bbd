//! Real-time playback command.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Args;
use plexus_io::{AudioBackend, BackendStreamConfig, CpalBackend, GraphPlayer, start_output};

use super::common::{load_config, open_graph, resolve_graph};

#[derive(Args)]
pub struct PlayArgs {
    /// Graph document (path or saved graph name)
    #[arg(value_name = "GRAPH")]
    graph: String,

    /// Output device (partial name; overrides the settings file)
    #[arg(short, long)]
    device: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,
}

pub fn run(args: PlayArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let path = resolve_graph(&args.graph)?;
    let mut loaded = open_graph(&path, &config)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let stream_config = BackendStreamConfig {
        sample_rate: config.sample_rate,
        buffer_size: config.block_size as u32,
        channels: config.device.channels,
        device_name: args.device.or_else(|| config.device.output.clone()),
    };
    let (player, _midi) = GraphPlayer::new(
        loaded.graph.reader(),
        config.block_size,
        config.midi_buffer_capacity,
    );
    let backend = CpalBackend::new();
    let sample_rate = f64::from(backend.actual_sample_rate(&stream_config));
    if sample_rate != loaded.graph.config().sample_rate {
        tracing::info!(sample_rate, "re-activating graph at device rate");
        loaded.graph.set_sample_rate(sample_rate);
    }
    let stream = start_output(&backend, &stream_config, player)?;

    println!(
        "Playing {} at {} Hz ({} frames). Press Ctrl+C to stop.",
        path.display(),
        config.sample_rate,
        config.block_size
    );

    let started = Instant::now();
    let interval = config.ui_timer_interval();
    while running.load(Ordering::SeqCst) {
        if args
            .seconds
            .is_some_and(|limit| started.elapsed().as_secs_f64() >= limit)
        {
            break;
        }
        std::thread::sleep(interval);
        loaded.graph.timer_callback();
        loaded.graph.collect_garbage();
    }

    drop(stream);
    tracing::info!(elapsed = ?started.elapsed(), "playback stopped");
    Ok(())
}
