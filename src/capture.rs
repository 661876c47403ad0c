//! The capture → preprocess → infer → decode → report loop.
//!
//! `CaptureLoop` owns the frame source, the inference backend and the report
//! sink for its whole lifetime. A run moves through
//! `Starting → Running → Stopping → Stopped`:
//!
//! - Starting validates the configuration, loads the model and opens the
//!   camera. Any failure ends the run with a startup fault before any frame is
//!   processed.
//! - Running repeats one cycle per frame until the cancellation token is set.
//!   The token is checked only between cycles; a cycle in progress always
//!   finishes (or abandons its capture) first.
//! - A missing frame is reported and skipped. Preprocess, invoke and decode
//!   failures are fatal and end the run.
//! - Source and backend are released exactly once on every exit path, including
//!   a panic unwinding through the loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::config::LoopConfig;
use crate::detect::{DetectionDecoder, InferenceBackend};
use crate::error::{FaultKind, LoopFault};
use crate::ingest::FrameSource;
use crate::metrics::{MetricsTracker, ThroughputSample};
use crate::preprocess::preprocess;
use crate::report::{FrameReport, ReportSink};

// ----------------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------------

/// Cooperative stop flag shared between the loop and a signal handler.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// States
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, `run` not called yet.
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Step within one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Capturing,
    Preprocessing,
    Inferring,
    Decoding,
    Reporting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Capturing => "capturing",
            Stage::Preprocessing => "preprocessing",
            Stage::Inferring => "inferring",
            Stage::Decoding => "decoding",
            Stage::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

/// Totals for a run that ended by cancellation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub capture_misses: u64,
    pub throughput: ThroughputSample,
}

// ----------------------------------------------------------------------------
// Handle guard
// ----------------------------------------------------------------------------

/// Releases the source and backend when dropped.
///
/// Created before either handle is acquired so that startup failures release
/// too; dropping is the only release path, so release happens exactly once.
struct Handles<'a, S: FrameSource, B: InferenceBackend> {
    source: &'a mut S,
    backend: &'a mut B,
}

impl<S: FrameSource, B: InferenceBackend> Drop for Handles<'_, S, B> {
    fn drop(&mut self) {
        self.source.release();
        self.backend.release();
        log::info!(
            "released {} source and {} backend",
            self.source.name(),
            self.backend.name()
        );
    }
}

// ----------------------------------------------------------------------------
// CaptureLoop
// ----------------------------------------------------------------------------

pub struct CaptureLoop<S: FrameSource, B: InferenceBackend, R: ReportSink> {
    config: LoopConfig,
    source: S,
    backend: B,
    reporter: R,
    decoder: DetectionDecoder,
    cancel: CancellationToken,
    state: LoopState,
}

impl<S: FrameSource, B: InferenceBackend, R: ReportSink> CaptureLoop<S, B, R> {
    pub fn new(
        config: LoopConfig,
        source: S,
        backend: B,
        reporter: R,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            backend,
            reporter,
            decoder: DetectionDecoder::default(),
            cancel,
            state: LoopState::Idle,
        }
    }

    /// Replace the default SSD output decoder.
    pub fn with_decoder(mut self, decoder: DetectionDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn into_parts(self) -> (S, B, R) {
        (self.source, self.backend, self.reporter)
    }

    /// Run until cancelled or until a fatal fault.
    ///
    /// Returns `Ok` only for a cancellation-driven shutdown. Faults are
    /// returned as `anyhow::Error` with a [`LoopFault`] attached.
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.state != LoopState::Idle {
            anyhow::bail!("capture loop already ran (state {:?})", self.state);
        }

        let result = {
            let mut driver = Driver {
                config: &self.config,
                decoder: &self.decoder,
                reporter: &mut self.reporter,
                cancel: &self.cancel,
                state: &mut self.state,
                handles: Handles {
                    source: &mut self.source,
                    backend: &mut self.backend,
                },
                metrics: MetricsTracker::new(),
                stage: Stage::Capturing,
                capture_misses: 0,
                consecutive_misses: 0,
            };
            driver.run()
            // Dropping the driver drops the handle guard.
        };

        self.reporter.released();
        log::debug!("capture loop: {:?} -> {:?}", self.state, LoopState::Stopped);
        self.state = LoopState::Stopped;
        result
    }
}

/// Borrowed view of the loop for the duration of one run.
struct Driver<'a, S: FrameSource, B: InferenceBackend, R: ReportSink> {
    config: &'a LoopConfig,
    decoder: &'a DetectionDecoder,
    reporter: &'a mut R,
    cancel: &'a CancellationToken,
    state: &'a mut LoopState,
    handles: Handles<'a, S, B>,
    metrics: MetricsTracker,
    stage: Stage,
    capture_misses: u64,
    consecutive_misses: u64,
}

impl<S: FrameSource, B: InferenceBackend, R: ReportSink> Driver<'_, S, B, R> {
    fn run(&mut self) -> Result<RunSummary> {
        self.enter(LoopState::Starting);
        if let Err(err) = self.start() {
            self.enter(LoopState::Stopping);
            return Err(err);
        }

        self.enter(LoopState::Running);
        self.metrics.reset();
        let input = self.handles.backend.input_shape();
        self.reporter.started(
            self.handles.source.name(),
            self.handles.backend.name(),
            input,
        );

        let result = loop {
            if self.cancel.is_cancelled() {
                log::info!("cancellation requested, stopping capture loop");
                break Ok(());
            }
            if let Err(err) = self.cycle(input) {
                break Err(err);
            }
        };

        self.enter(LoopState::Stopping);
        result?;

        let throughput = self.metrics.sample_throughput();
        Ok(RunSummary {
            frames: self.metrics.frame_count(),
            capture_misses: self.capture_misses,
            throughput,
        })
    }

    fn start(&mut self) -> Result<()> {
        self.config.validate().map_err(|err| {
            err.context(LoopFault::startup(
                FaultKind::Config,
                "invalid loop configuration",
            ))
        })?;

        let model_path = &self.config.model_path;
        log::info!("loading model {}", model_path);
        self.handles.backend.load(model_path).map_err(|err| {
            err.context(LoopFault::startup(
                FaultKind::Load,
                format!("failed to load model {}", model_path),
            ))
        })?;
        let (width, height) = self.handles.backend.input_shape();
        log::info!("model loaded, input size {}x{}", width, height);

        let index = self.config.camera_index;
        self.handles.source.open(index).map_err(|err| {
            err.context(LoopFault::startup(
                FaultKind::Open,
                format!("failed to open camera {}", index),
            ))
        })?;
        log::info!("camera {} opened", index);
        Ok(())
    }

    fn cycle(&mut self, input: (u32, u32)) -> Result<()> {
        self.step(Stage::Capturing);
        let Some(frame) = self.handles.source.capture() else {
            self.capture_misses += 1;
            self.consecutive_misses += 1;
            self.reporter.capture_miss(self.consecutive_misses);
            return Ok(());
        };
        self.consecutive_misses = 0;

        self.step(Stage::Preprocessing);
        let tensor = preprocess(
            &frame,
            input,
            self.config.channel_order,
            self.config.flip_vertical,
        )
        .map_err(|err| self.fault(FaultKind::Preprocess, err.into(), "preprocess failed"))?;

        self.step(Stage::Inferring);
        let invocation = self
            .handles
            .backend
            .invoke(&tensor)
            .map_err(|err| self.fault(FaultKind::Invoke, err, "inference failed"))?;

        self.step(Stage::Decoding);
        let detections = self
            .decoder
            .decode(&invocation.output, self.config.score_threshold)
            .map_err(|err| self.fault(FaultKind::Decode, err.into(), "output decode failed"))?;

        self.step(Stage::Reporting);
        self.reporter.frame(&FrameReport {
            sequence: self.metrics.frame_count() + 1,
            width: frame.width,
            height: frame.height,
            input_size: input,
            detections: &detections,
            inference: invocation.elapsed,
        });
        self.metrics.record_frame();

        if self.metrics.frame_count() % self.config.report_interval == 0 {
            let sample = self.metrics.sample_throughput();
            self.reporter.throughput(&sample);
        }
        Ok(())
    }

    fn step(&mut self, stage: Stage) {
        log::trace!("cycle stage: {}", stage);
        self.stage = stage;
    }

    fn enter(&mut self, state: LoopState) {
        log::debug!("capture loop: {:?} -> {:?}", *self.state, state);
        *self.state = state;
    }

    fn fault(&self, kind: FaultKind, err: anyhow::Error, message: &str) -> anyhow::Error {
        err.context(LoopFault::in_loop(kind, self.stage, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Invocation, SyntheticBackend};
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use crate::report::ConsoleReporter;
    use crate::frame::Tensor;

    /// Backend that cancels the token after a fixed number of invocations.
    struct CancelAfter {
        inner: SyntheticBackend,
        remaining: u32,
        cancel: CancellationToken,
    }

    impl InferenceBackend for CancelAfter {
        fn name(&self) -> &'static str {
            "cancel-after"
        }

        fn load(&mut self, model_path: &str) -> Result<()> {
            self.inner.load(model_path)
        }

        fn input_shape(&self) -> (u32, u32) {
            self.inner.input_shape()
        }

        fn invoke(&mut self, input: &Tensor) -> Result<Invocation> {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.cancel.cancel();
            }
            self.inner.invoke(input)
        }
    }

    fn config() -> LoopConfig {
        LoopConfig {
            model_path: "stub://test".to_string(),
            input_size: (16, 16),
            report_interval: 5,
            ..LoopConfig::default()
        }
    }

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn synthetic_run_stops_on_cancel() -> Result<()> {
        let cancel = CancellationToken::new();
        let source = SyntheticSource::new(SyntheticConfig {
            width: 32,
            height: 24,
            miss_every: Some(4),
        });
        let backend = CancelAfter {
            inner: SyntheticBackend::new((16, 16)),
            remaining: 10,
            cancel: cancel.clone(),
        };
        let mut capture = CaptureLoop::new(
            config(),
            source,
            backend,
            ConsoleReporter::new(Vec::new()),
            cancel,
        );
        assert_eq!(capture.state(), LoopState::Idle);

        let summary = capture.run()?;
        assert_eq!(capture.state(), LoopState::Stopped);
        assert_eq!(summary.frames, 10);
        assert_eq!(summary.capture_misses, 3);

        let (source, _, reporter) = capture.into_parts();
        assert_eq!(source.stats().frames_captured, 10);
        let out = String::from_utf8(reporter.into_inner())?;
        assert_eq!(out.lines().filter(|l| l.starts_with("throughput:")).count(), 2);
        assert_eq!(out.lines().last(), Some("released camera and accelerator"));
        Ok(())
    }

    #[test]
    fn run_twice_is_rejected() -> Result<()> {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut capture = CaptureLoop::new(
            config(),
            SyntheticSource::new(SyntheticConfig::default()),
            SyntheticBackend::new((16, 16)),
            ConsoleReporter::new(Vec::new()),
            cancel,
        );
        let summary = capture.run()?;
        assert_eq!(summary.frames, 0);
        assert!(capture.run().is_err());
        Ok(())
    }
}
