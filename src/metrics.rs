//! Frame counting and throughput sampling for the capture loop.

use std::time::Instant;

/// Elapsed times below this are too short for a meaningful rate.
pub const MIN_ELAPSED_SECS: f64 = 1e-3;

/// One throughput reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThroughputSample {
    pub frame_count: u64,
    pub elapsed_secs: f64,
    /// Average frames per second since the loop started.
    pub fps: Option<f64>,
    /// Frames per second since the previous sample.
    pub window_fps: Option<f64>,
}

/// Loop-lifetime counters. Owned and mutated by the capture loop only.
#[derive(Debug)]
pub struct MetricsTracker {
    frame_count: u64,
    started_at: Instant,
    window_started_at: Instant,
    window_start_count: u64,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            frame_count: 0,
            started_at: start,
            window_started_at: start,
            window_start_count: 0,
        }
    }

    /// Reset all counters; called when the loop enters `Running`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Count one successfully processed frame.
    pub fn record_frame(&mut self) {
        self.frame_count += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn sample_throughput(&mut self) -> ThroughputSample {
        self.sample_throughput_at(Instant::now())
    }

    /// Sample throughput as of `now` and start a new window.
    pub fn sample_throughput_at(&mut self, now: Instant) -> ThroughputSample {
        let elapsed_secs = now.saturating_duration_since(self.started_at).as_secs_f64();
        let window_secs = now
            .saturating_duration_since(self.window_started_at)
            .as_secs_f64();
        let window_frames = self.frame_count - self.window_start_count;

        self.window_started_at = now;
        self.window_start_count = self.frame_count;

        ThroughputSample {
            frame_count: self.frame_count,
            elapsed_secs,
            fps: rate(self.frame_count, elapsed_secs),
            window_fps: rate(window_frames, window_secs),
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn rate(frames: u64, secs: f64) -> Option<f64> {
    if secs < MIN_ELAPSED_SECS {
        None
    } else {
        Some(frames as f64 / secs)
    }
}
