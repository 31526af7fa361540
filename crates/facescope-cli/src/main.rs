use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facescope_core::{load_models, DetectorVariant, EngineHandle, Frame, Geometry, InferenceEngine};
use facescope_media::{MediaHandle, MediaInfo, PacedPlayer};
use facescope_render::{save_snapshot, RasterFactory};
use facescope_session::{ControlState, ControllerState, GeometryManager, SamplerStats, SessionController};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{Command, HELP};
use config::Config;

const RECONCILE_INTERVAL: Duration = Duration::from_millis(250);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

type Controller = SessionController<EngineHandle, RasterFactory, PacedPlayer>;

#[derive(Parser)]
#[command(name = "facescope", about = "Face detection overlay on video playback")]
struct Cli {
    /// Directory containing the ONNX models
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    /// SCRFD detector variant: 10g, 2.5g, or 500m
    #[arg(long, global = true)]
    detector: Option<DetectorVariant>,
    /// Minimum detection confidence
    #[arg(long, global = true)]
    min_confidence: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a video with live detection overlay; reads commands from stdin.
    ///
    /// Needs a build with `--features ffmpeg`; without it start-up fails
    /// with a decoder-unavailable error.
    Run {
        /// Video to open at start (.mp4 path or URL)
        source: Option<String>,
        /// Initial viewport width in pixels
        #[arg(long)]
        viewport_width: Option<u32>,
        /// Write composited display+overlay PNGs here once per second
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
        /// Detection sampling period in milliseconds
        #[arg(long)]
        sample_interval_ms: Option<u64>,
    },
    /// Detect faces and expressions in a still image and print JSON
    Detect {
        image: PathBuf,
        #[arg(long)]
        pretty: bool,
    },
    /// Validate a video and print its stream properties (needs `--features ffmpeg`)
    Probe { source: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    if let Some(variant) = cli.detector {
        config.detector = variant;
    }
    if let Some(min_confidence) = cli.min_confidence {
        config.min_confidence = min_confidence;
    }

    match cli.command {
        Commands::Run {
            source,
            viewport_width,
            snapshot_dir,
            sample_interval_ms,
        } => {
            if let Some(width) = viewport_width {
                config.viewport_width = width;
            }
            if snapshot_dir.is_some() {
                config.snapshot_dir = snapshot_dir;
            }
            if let Some(ms) = sample_interval_ms {
                config.sample_interval = Duration::from_millis(ms);
            }
            run(config, source).await
        }
        Commands::Detect { image, pretty } => detect(&config, &image, pretty).await,
        Commands::Probe { source } => probe(&source),
    }
}

async fn run(config: Config, source: Option<String>) -> Result<()> {
    let player = facescope_media::open_player().context("cannot start video playback")?;
    let mut controller: Controller = SessionController::new(
        RasterFactory::new(),
        player,
        GeometryManager::new(config.viewport_width, config.max_display_width),
        config.session_settings(),
    );

    tracing::info!(model_dir = %config.model_dir.display(), detector = %config.detector, "facescope starting");
    load(&mut controller, &config).await;

    if let Some(source) = source.or_else(|| config.sample_source.clone()) {
        open(&mut controller, source).await;
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reconcile = interval(RECONCILE_INTERVAL);
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut snapshots = interval(SNAPSHOT_INTERVAL);
    snapshots.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut snapshot_index = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => handle(&mut controller, &config, command).await,
                    Ok(None) => {}
                    Err(msg) => eprintln!("{msg}"),
                }
            }
            _ = reconcile.tick() => {
                if controller.reconcile() {
                    tracing::info!(playing = controller.source_state().is_playing, "playback state changed");
                }
            }
            _ = snapshots.tick(), if config.snapshot_dir.is_some() => {
                if let (Some(dir), Some(image)) = (&config.snapshot_dir, controller.factory().composite()) {
                    match save_snapshot(&image, dir, snapshot_index) {
                        Ok(path) => tracing::debug!(path = %path.display(), "snapshot written"),
                        Err(e) => tracing::warn!(error = %e, "snapshot failed"),
                    }
                    snapshot_index += 1;
                }
            }
        }
    }

    tracing::info!("facescope shutting down");
    controller.dispose();
    Ok(())
}

async fn handle(controller: &mut Controller, config: &Config, command: Command) {
    let result = match command {
        Command::Open(path) => {
            open(controller, path).await;
            Ok(())
        }
        Command::Play => controller.play().map(|_| ()),
        Command::Pause => controller.pause().map(|_| ()),
        Command::Resize(width) => controller.resize(width).map(|_| ()),
        Command::Status => {
            print_status(controller);
            Ok(())
        }
        Command::Load => {
            load(controller, config).await;
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
    }
}

async fn load(controller: &mut Controller, config: &Config) {
    let engine_config = config.engine_config();
    if let Err(e) = controller.load_models(load_models(&engine_config)).await {
        eprintln!("error: {e}");
        eprintln!("models are expected in {}; type `load` to retry", config.model_dir.display());
    }
}

async fn open(controller: &mut Controller, location: String) {
    match controller.select_source(MediaHandle::new(location)).await {
        Ok(info) => println!(
            "playing {}x{} @ {:.2} fps ({})",
            info.width, info.height, info.fps, info.codec
        ),
        Err(e) => eprintln!("error: {e}"),
    }
}

#[derive(Serialize)]
struct Status<'a> {
    state: ControllerState,
    controls: ControlState,
    geometry: Geometry,
    source: Option<&'a MediaHandle>,
    playing: bool,
    media: Option<&'a MediaInfo>,
    generation: u64,
    sampler: Option<SamplerStats>,
}

fn print_status(controller: &Controller) {
    let source = controller.source_state();
    let status = Status {
        state: controller.state(),
        controls: controller.controls(),
        geometry: controller.geometry(),
        source: source.source.as_ref(),
        playing: source.is_playing,
        media: controller.media_info(),
        generation: controller.generation(),
        sampler: controller.session_stats(),
    };
    match serde_json::to_string_pretty(&status) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: {e}"),
    }
}

async fn detect(config: &Config, path: &std::path::Path, pretty: bool) -> Result<()> {
    let image = image::open(path)
        .with_context(|| format!("cannot read image {}", path.display()))?
        .to_rgb8();
    let frame = Frame::from_image(image, 0, Duration::ZERO)?;

    let engine = load_models(&config.engine_config()).await?;
    let batch = engine.detect(Arc::new(frame), config.detect_options()).await?;
    tracing::info!(faces = batch.faces.len(), detector = %engine.variant(), "detection complete");

    let json = if pretty {
        serde_json::to_string_pretty(&batch)?
    } else {
        serde_json::to_string(&batch)?
    };
    println!("{json}");
    Ok(())
}

fn probe(source: &str) -> Result<()> {
    let handle = MediaHandle::new(source);
    let info = facescope_media::probe(&handle)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
