//! framepace - Frame-cadence scheduling for real-time video playback
//!
//! Runs a synthetic playback session through the scheduler and reports how
//! frames were paced onto the display.

mod simulate;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use framepace_core::Config;
use simulate::SimulationOptions;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// framepace - Simulate frame scheduling for a content/display rate pair
#[derive(Parser, Debug)]
#[command(name = "framepace")]
#[command(version, about, long_about = None)]
struct Args {
    /// Content frame rate
    #[arg(short, long, default_value = "23.976")]
    content_fps: f64,

    /// Display refresh rate
    #[arg(short, long, default_value = "60")]
    refresh_hz: f64,

    /// Number of render ticks to simulate
    #[arg(short, long, default_value = "600")]
    ticks: u32,

    /// Maximum random delay added to each render deadline, in microseconds
    #[arg(long, default_value = "0")]
    jitter_us: u64,

    /// Seed for jitter and display drops
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Probability that a rendered frame never reaches the screen
    #[arg(long, default_value = "0")]
    drop_probability: f64,

    /// Frames the producer keeps ahead of the display
    #[arg(short, long, default_value = "6")]
    buffer: usize,

    /// Size of each synthetic frame in bytes
    #[arg(long, default_value = "3110400")]
    frame_bytes: usize,

    /// Present every frame in order instead of skipping late ones
    #[arg(long)]
    disable_frame_dropping: bool,

    /// Pause the playback clock at this tick
    #[arg(long)]
    pause_at: Option<u32>,

    /// How long the clock stays paused
    #[arg(long, default_value = "30")]
    pause_ticks: u32,

    /// Stop rendering at this tick, expiring stale frames instead
    #[arg(long)]
    hidden_at: Option<u32>,

    /// How long rendering stays stopped
    #[arg(long, default_value = "30")]
    hidden_ticks: u32,

    /// Path to a JSON scheduler configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("framepace v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Config::load(path)?
        }
        None => Config::new(),
    };
    if args.disable_frame_dropping {
        config = config.with_frame_dropping_disabled(true);
    }

    let options = SimulationOptions {
        content_fps: args.content_fps,
        refresh_hz: args.refresh_hz,
        ticks: args.ticks,
        jitter: Duration::from_micros(args.jitter_us),
        seed: args.seed,
        drop_probability: args.drop_probability,
        buffer: args.buffer,
        frame_bytes: args.frame_bytes,
        pause_at: args.pause_at,
        pause_ticks: args.pause_ticks,
        hidden_at: args.hidden_at,
        hidden_ticks: args.hidden_ticks,
    };

    info!(
        "Simulating {} ticks: {}fps content on a {}Hz display",
        options.ticks, options.content_fps, options.refresh_hz
    );
    let report = simulate::run(&options, &config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    info!("");
    info!("  Ticks rendered:    {}", report.ticks_rendered);
    info!("  Frames enqueued:   {}", report.frames_enqueued);
    info!("  Frames presented:  {}", report.frames_presented);
    info!("  Frames dropped:    {}", report.frames_dropped);
    info!("  Frames expired:    {}", report.frames_expired);
    info!("  Display drops:     {}", report.display_drops);
    info!("  Render counts:     {}", report.histogram_summary());
    info!("  Scheduler:         {}", report.stats.summary());
    info!("");
    if report.glitches > 0 {
        warn!("{} renders drifted beyond the acceptable maximum", report.glitches);
    }

    Ok(())
}
