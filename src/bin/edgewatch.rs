//! edgewatch - live camera object detection
//!
//! This binary:
//! 1. Loads the run configuration (file, environment, command line)
//! 2. Loads the detection model and opens the camera
//! 3. Reports detections and inference latency for every frame
//! 4. Reports average throughput every N frames
//! 5. Stops after the current frame on Ctrl-C and releases camera and model

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use edgewatch::{
    fault_kind, AcceleratorBackend, CameraSource, CancellationToken, CaptureLoop,
    ConsoleReporter, DetectionDecoder, LabelMap, LoopConfig, RunSummary, SourceKind,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run object detection on a live camera feed and report detections and throughput"
)]
struct Args {
    /// Config file (TOML, or JSON with a .json extension). Falls back to $EDGEWATCH_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model path. `stub://<name>` selects the synthetic backend.
    #[arg(long)]
    model: Option<String>,

    /// Label file mapping class ids to names.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Minimum score for a detection to be reported.
    #[arg(long)]
    score_threshold: Option<f32>,

    /// Flip frames vertically before inference.
    #[arg(long)]
    flip_vertical: Option<bool>,

    /// Camera device index.
    #[arg(long)]
    camera_index: Option<u32>,

    /// Camera implementation.
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Report average throughput every N processed frames.
    #[arg(long)]
    report_interval: Option<u64>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(summary) => {
            let fps = summary
                .throughput
                .fps
                .map(|fps| format!("{:.2} fps", fps))
                .unwrap_or_else(|| "n/a".to_string());
            log::info!(
                "stopped: {} frames processed, {} capture misses, avg {}",
                summary.frames,
                summary.capture_misses,
                fps
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            match fault_kind(&err) {
                Some(kind) if kind.is_startup() => log::error!("startup failed: {:#}", err),
                Some(_) => log::error!("capture loop stopped on fault: {:#}", err),
                None => log::error!("{:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<RunSummary> {
    let config = load_config(&args)?;
    log::info!(
        "model={} threshold={:.2} flip_vertical={} camera={} source={:?} interval={}",
        config.model_path,
        config.score_threshold,
        config.flip_vertical,
        config.camera_index,
        config.source,
        config.report_interval
    );

    let cancel = CancellationToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupted, stopping after the current frame");
        handler_cancel.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let source = CameraSource::new(config.source, config.capture_size)?;
    let backend = AcceleratorBackend::for_model(&config.model_path, config.input_size)?;
    let mut decoder = DetectionDecoder::default();
    if let Some(path) = &config.labels_path {
        decoder = decoder.with_labels(LabelMap::load(path)?);
    }

    let mut capture = CaptureLoop::new(
        config,
        source,
        backend,
        ConsoleReporter::stdout(),
        cancel,
    )
    .with_decoder(decoder);
    capture.run()
}

fn load_config(args: &Args) -> Result<LoopConfig> {
    let mut config = LoopConfig::load(args.config.as_deref())?;
    if let Some(model) = &args.model {
        config.model_path = model.clone();
    }
    if let Some(labels) = &args.labels {
        config.labels_path = Some(labels.clone());
    }
    if let Some(threshold) = args.score_threshold {
        config.score_threshold = threshold;
    }
    if let Some(flip) = args.flip_vertical {
        config.flip_vertical = flip;
    }
    if let Some(index) = args.camera_index {
        config.camera_index = index;
    }
    if let Some(source) = args.source {
        config.source = source;
    }
    if let Some(interval) = args.report_interval {
        config.report_interval = interval;
    }
    config.validate()?;
    Ok(config)
}
