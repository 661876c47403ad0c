//! edgewatch
//!
//! Continuous object detection on a live camera feed. Each captured frame is
//! flipped (optionally), resized and reordered into the model's input tensor,
//! run through an inference backend, decoded into scored bounding boxes, and
//! reported together with inference latency and rolling throughput.
//!
//! # Architecture
//!
//! The crate is built around one synchronous loop with two capability traits
//! at its edges:
//!
//! - [`FrameSource`]: camera access (V4L2 devices, synthetic frames).
//! - [`InferenceBackend`]: model execution (tract/ONNX, synthetic outputs).
//!
//! Everything between them is pure: [`preprocess`] builds the tensor,
//! [`DetectionDecoder`] filters and types the raw output, [`MetricsTracker`]
//! keeps counts. [`CaptureLoop`] drives the cycle, stops cooperatively through
//! a [`CancellationToken`], and releases both handles exactly once on every
//! exit path.
//!
//! # Module Structure
//!
//! - `frame`: Frame, Tensor and backend output containers
//! - `ingest`: Frame sources
//! - `preprocess`: Frame to tensor conversion
//! - `detect`: Backends, output decoding, label maps
//! - `metrics`: Frame counts and throughput
//! - `report`: Line-oriented progress reporting
//! - `capture`: The capture loop and its state machine
//! - `config`: Layered run configuration
//! - `error`: Fault taxonomy

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod metrics;
pub mod preprocess;
pub mod report;

pub use capture::{CancellationToken, CaptureLoop, LoopState, RunSummary, Stage};
pub use config::LoopConfig;
pub use detect::{
    AcceleratorBackend, BoundingBox, Detection, DetectionDecoder, InferenceBackend, Invocation,
    LabelMap, OutputSchema,
};
pub use error::{fault_kind, FaultKind, LoopFault};
pub use frame::{ChannelOrder, Frame, OutputTensor, PixelLayout, RawOutput, Tensor};
pub use ingest::{CameraSource, CaptureSize, FrameSource, SourceKind, SourceStats};
pub use metrics::{MetricsTracker, ThroughputSample};
pub use preprocess::{preprocess, PreprocessError};
pub use report::{ConsoleReporter, FrameReport, ReportSink};
