use anyhow::Result;

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, PixelLayout};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// When set, every n-th capture yields no frame.
    pub miss_every: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            miss_every: None,
        }
    }
}

/// Synthetic BGR camera for dry runs and tests.
///
/// Produces a moving gradient that changes scene every 50 frames.
pub struct SyntheticSource {
    config: SyntheticConfig,
    opened: bool,
    attempts: u64,
    stats: SourceStats,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            opened: false,
            attempts: 0,
            stats: SourceStats::default(),
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let frame_count = self.stats.frames_captured;
        if frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&mut self, device_index: u32) -> Result<()> {
        self.opened = true;
        log::info!(
            "SyntheticSource: opened camera {} ({}x{})",
            device_index,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn capture(&mut self) -> Option<Frame> {
        if !self.opened {
            self.stats.misses += 1;
            return None;
        }
        self.attempts += 1;
        if let Some(every) = self.config.miss_every {
            if every > 0 && self.attempts.is_multiple_of(every) {
                self.stats.misses += 1;
                return None;
            }
        }
        let pixels = self.generate_pixels();
        self.stats.frames_captured += 1;
        Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelLayout::Bgr24,
        ))
    }

    fn release(&mut self) {
        if self.opened {
            log::debug!("SyntheticSource: released");
        }
        self.opened = false;
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_frames_after_open() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 32,
            height: 24,
            miss_every: None,
        });
        assert!(source.capture().is_none());

        source.open(0)?;
        let frame = source.capture().expect("frame");
        assert_eq!((frame.width, frame.height), (32, 24));
        assert_eq!(frame.layout, PixelLayout::Bgr24);
        assert_eq!(frame.pixels().len(), frame.expected_len().unwrap());

        source.release();
        assert!(source.capture().is_none());
        Ok(())
    }

    #[test]
    fn scripted_misses() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 4,
            height: 4,
            miss_every: Some(3),
        });
        source.open(0)?;
        let got: Vec<bool> = (0..6).map(|_| source.capture().is_some()).collect();
        assert_eq!(got, vec![true, true, false, true, true, false]);
        let stats = source.stats();
        assert_eq!(stats.frames_captured, 4);
        assert_eq!(stats.misses, 2);
        Ok(())
    }
}
