use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frame::ChannelOrder;
use crate::ingest::{CaptureSize, SourceKind};

const DEFAULT_MODEL_PATH: &str = "face_detector.onnx";
const DEFAULT_SCORE_THRESHOLD: f32 = 0.6;
const DEFAULT_FLIP_VERTICAL: bool = true;
const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_REPORT_INTERVAL: u64 = 30;
const DEFAULT_INPUT_SIZE: u32 = 320;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

pub const CONFIG_ENV: &str = "EDGEWATCH_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    report: Option<ReportConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<String>,
    labels: Option<PathBuf>,
    score_threshold: Option<f32>,
    channel_order: Option<ChannelOrder>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    index: Option<u32>,
    source: Option<SourceKind>,
    width: Option<u32>,
    height: Option<u32>,
    flip_vertical: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ReportConfigFile {
    interval: Option<u64>,
}

/// Configuration snapshot for one run of the capture loop.
///
/// Built once before the loop starts and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub model_path: String,
    pub labels_path: Option<PathBuf>,
    pub score_threshold: f32,
    pub channel_order: ChannelOrder,
    /// Input size used when the backend cannot report one from the model.
    pub input_size: (u32, u32),
    pub camera_index: u32,
    pub source: SourceKind,
    pub capture_size: CaptureSize,
    pub flip_vertical: bool,
    /// Report throughput every this many processed frames.
    pub report_interval: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.to_string(),
            labels_path: None,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            channel_order: ChannelOrder::Rgb,
            input_size: (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE),
            camera_index: DEFAULT_CAMERA_INDEX,
            source: SourceKind::default(),
            capture_size: CaptureSize {
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
            },
            flip_vertical: DEFAULT_FLIP_VERTICAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl LoopConfig {
    /// Load defaults, then the config file (`path`, else `EDGEWATCH_CONFIG`),
    /// then `EDGEWATCH_*` environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let defaults = Self::default();
        let model = file.model.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let report = file.report.unwrap_or_default();
        Self {
            model_path: model.path.unwrap_or(defaults.model_path),
            labels_path: model.labels,
            score_threshold: model.score_threshold.unwrap_or(defaults.score_threshold),
            channel_order: model.channel_order.unwrap_or(defaults.channel_order),
            input_size: (
                model.input_width.unwrap_or(defaults.input_size.0),
                model.input_height.unwrap_or(defaults.input_size.1),
            ),
            camera_index: camera.index.unwrap_or(defaults.camera_index),
            source: camera.source.unwrap_or(defaults.source),
            capture_size: CaptureSize {
                width: camera.width.unwrap_or(defaults.capture_size.width),
                height: camera.height.unwrap_or(defaults.capture_size.height),
            },
            flip_vertical: camera.flip_vertical.unwrap_or(defaults.flip_vertical),
            report_interval: report.interval.unwrap_or(defaults.report_interval),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("EDGEWATCH_MODEL_PATH") {
            self.model_path = path;
        }
        if let Some(path) = env_value("EDGEWATCH_LABELS_PATH") {
            self.labels_path = Some(PathBuf::from(path));
        }
        if let Some(threshold) = env_value("EDGEWATCH_SCORE_THRESHOLD") {
            self.score_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("EDGEWATCH_SCORE_THRESHOLD must be a number"))?;
        }
        if let Some(flip) = env_value("EDGEWATCH_FLIP_VERTICAL") {
            self.flip_vertical = parse_bool(&flip)
                .ok_or_else(|| anyhow!("EDGEWATCH_FLIP_VERTICAL must be true or false"))?;
        }
        if let Some(index) = env_value("EDGEWATCH_CAMERA_INDEX") {
            self.camera_index = index
                .parse()
                .map_err(|_| anyhow!("EDGEWATCH_CAMERA_INDEX must be a non-negative integer"))?;
        }
        if let Some(source) = env_value("EDGEWATCH_SOURCE") {
            self.source = match source.to_ascii_lowercase().as_str() {
                "v4l2" => SourceKind::V4l2,
                "synthetic" => SourceKind::Synthetic,
                other => bail!("EDGEWATCH_SOURCE must be v4l2 or synthetic, got {}", other),
            };
        }
        if let Some(interval) = env_value("EDGEWATCH_REPORT_INTERVAL") {
            self.report_interval = interval
                .parse()
                .map_err(|_| anyhow!("EDGEWATCH_REPORT_INTERVAL must be a positive integer"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_path.trim().is_empty() {
            bail!("model path must not be empty");
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            bail!(
                "score threshold must be within [0, 1], got {}",
                self.score_threshold
            );
        }
        if self.report_interval == 0 {
            bail!("report interval must be at least 1");
        }
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            bail!("model input size must be non-zero");
        }
        if self.capture_size.width == 0 || self.capture_size.height == 0 {
            bail!("camera capture size must be non-zero");
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
