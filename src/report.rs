//! Human-readable reporting of loop progress.
//!
//! The loop hands every event to a [`ReportSink`]. [`ConsoleReporter`] turns
//! them into a line-oriented stream:
//!
//! ```text
//! frame #12 640x480: 2 detection(s), inference 11.8 ms
//!   #1 score=0.91 bbox=(40, 52, 118, 160) label=face
//!   #2 score=0.66 bbox=(201, 33, 260, 104)
//! warning: skipped frame (capture miss, 1 consecutive)
//! throughput: 30 frames in 1.02 s, avg 29.41 fps, window 29.41 fps
//! released camera and accelerator
//! ```

use std::io::{self, Write};
use std::time::Duration;

use crate::detect::Detection;
use crate::metrics::ThroughputSample;

/// Everything reported about one processed frame.
#[derive(Debug)]
pub struct FrameReport<'a> {
    /// 1-based number of this frame among processed frames.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Model input size the boxes refer to.
    pub input_size: (u32, u32),
    pub detections: &'a [Detection],
    pub inference: Duration,
}

pub trait ReportSink {
    fn started(&mut self, source: &str, backend: &str, input_size: (u32, u32));
    fn frame(&mut self, report: &FrameReport<'_>);
    fn capture_miss(&mut self, consecutive: u64);
    fn throughput(&mut self, sample: &ThroughputSample);
    fn released(&mut self);
}

/// Writes report lines to any `Write` (stdout by default).
pub struct ConsoleReporter<W: Write> {
    out: W,
    write_failed: bool,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            write_failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        let result = self
            .out
            .write_fmt(args)
            .and_then(|_| self.out.write_all(b"\n"))
            .and_then(|_| self.out.flush());
        if let Err(err) = result {
            // Reporting never stops the loop; note the first failure only.
            if !self.write_failed {
                log::warn!("report output failed: {}", err);
                self.write_failed = true;
            }
        }
    }
}

impl<W: Write> ReportSink for ConsoleReporter<W> {
    fn started(&mut self, source: &str, backend: &str, input_size: (u32, u32)) {
        self.line(format_args!(
            "running detection: source={} backend={} input={}x{}",
            source, backend, input_size.0, input_size.1
        ));
    }

    fn frame(&mut self, report: &FrameReport<'_>) {
        self.line(format_args!(
            "frame #{} {}x{}: {} detection(s), inference {:.1} ms",
            report.sequence,
            report.width,
            report.height,
            report.detections.len(),
            report.inference.as_secs_f64() * 1000.0
        ));
        let (in_w, in_h) = report.input_size;
        for (i, detection) in report.detections.iter().enumerate() {
            let [x0, y0, x1, y1] = detection.bbox.to_pixels(in_w, in_h);
            match &detection.label {
                Some(label) => self.line(format_args!(
                    "  #{} score={:.2} bbox=({}, {}, {}, {}) label={}",
                    i + 1,
                    detection.score,
                    x0,
                    y0,
                    x1,
                    y1,
                    label
                )),
                None => self.line(format_args!(
                    "  #{} score={:.2} bbox=({}, {}, {}, {})",
                    i + 1,
                    detection.score,
                    x0,
                    y0,
                    x1,
                    y1
                )),
            }
        }
    }

    fn capture_miss(&mut self, consecutive: u64) {
        log::warn!("capture miss ({} consecutive)", consecutive);
        self.line(format_args!(
            "warning: skipped frame (capture miss, {} consecutive)",
            consecutive
        ));
    }

    fn throughput(&mut self, sample: &ThroughputSample) {
        match (sample.fps, sample.window_fps) {
            (Some(fps), Some(window)) => self.line(format_args!(
                "throughput: {} frames in {:.2} s, avg {:.2} fps, window {:.2} fps",
                sample.frame_count, sample.elapsed_secs, fps, window
            )),
            (Some(fps), None) => self.line(format_args!(
                "throughput: {} frames in {:.2} s, avg {:.2} fps",
                sample.frame_count, sample.elapsed_secs, fps
            )),
            (None, _) => self.line(format_args!(
                "throughput: {} frames in {:.2} s",
                sample.frame_count, sample.elapsed_secs
            )),
        }
    }

    fn released(&mut self) {
        self.line(format_args!("released camera and accelerator"));
    }
}
