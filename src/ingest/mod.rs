//! Frame sources.
//!
//! - Synthetic source (dry runs and tests)
//! - V4L2 devices (feature: ingest-v4l2)
//!
//! A source is opened once by the capture loop, polled for one frame per
//! cycle, and released exactly once when the loop stops. A source that has no
//! frame for a cycle returns `None`; the loop logs the miss and moves on.
//!
//! Sources MUST NOT:
//! - Buffer more than the frame being handed out
//! - Store captured frames to disk
//! - Retain frames beyond handoff to the loop

#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use serde::Deserialize;

use crate::frame::Frame;

pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::DeviceSource;

/// Capture counters for a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub misses: u64,
}

/// Camera access used by the capture loop.
pub trait FrameSource {
    /// Source identifier.
    fn name(&self) -> &'static str;

    /// Acquire the camera with the given index.
    fn open(&mut self, device_index: u32) -> Result<()>;

    /// Capture the next frame, or `None` when no frame is available this cycle.
    fn capture(&mut self) -> Option<Frame>;

    /// Release the camera. Called even when `open` failed.
    fn release(&mut self);

    fn stats(&self) -> SourceStats;
}

/// Which camera implementation to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    V4l2,
    Synthetic,
}

/// Requested capture resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSize {
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Camera selected by `SourceKind`.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceSource),
}

impl CameraSource {
    pub fn new(kind: SourceKind, size: CaptureSize) -> Result<Self> {
        match kind {
            SourceKind::Synthetic => Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(SyntheticConfig {
                    width: size.width,
                    height: size.height,
                    miss_every: None,
                })),
            }),
            SourceKind::V4l2 => {
                #[cfg(feature = "ingest-v4l2")]
                {
                    Ok(Self {
                        backend: CameraBackend::Device(DeviceSource::new(size)),
                    })
                }
                #[cfg(not(feature = "ingest-v4l2"))]
                {
                    anyhow::bail!("v4l2 capture requires the ingest-v4l2 feature")
                }
            }
        }
    }

    fn source(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source,
        }
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> &'static str {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.name(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.name(),
        }
    }

    fn open(&mut self, device_index: u32) -> Result<()> {
        self.source().open(device_index)
    }

    fn capture(&mut self) -> Option<Frame> {
        self.source().capture()
    }

    fn release(&mut self) {
        self.source().release()
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}
