use std::time::Instant;

use anyhow::{anyhow, bail, Result};

use crate::detect::backend::{InferenceBackend, Invocation};
use crate::frame::{OutputTensor, RawOutput, Tensor};

/// Prefix that selects the synthetic backend instead of a model file.
pub const SYNTHETIC_MODEL_PREFIX: &str = "stub://";

/// Candidate slots produced per invocation.
const SLOTS: usize = 4;

/// Synthetic backend for tests and dry runs.
///
/// Derives candidate boxes and scores from a digest of the input tensor, so
/// identical frames give identical outputs. Output follows the SSD
/// post-processed layout: boxes, classes, scores, count.
pub struct SyntheticBackend {
    input: (u32, u32),
    loaded: bool,
}

impl SyntheticBackend {
    pub fn new(input: (u32, u32)) -> Self {
        Self {
            input,
            loaded: false,
        }
    }

    fn candidates(digest: &[u8; 32]) -> RawOutput {
        let mut slots: Vec<([f32; 4], f32, f32)> = (0..SLOTS)
            .map(|i| {
                let b = &digest[4 + i * 4..8 + i * 4];
                let ymin = b[0] as f32 / 510.0;
                let xmin = b[1] as f32 / 510.0;
                let ymax = ymin + 0.1 + b[2] as f32 / 640.0;
                let xmax = xmin + 0.1 + b[3] as f32 / 640.0;
                let score = digest[i] as f32 / 255.0;
                let class = (digest[20 + i] % 2) as f32;
                ([ymin, xmin, ymax, xmax], class, score)
            })
            .collect();
        // Post-processed outputs arrive best-first.
        slots.sort_by(|a, b| b.2.total_cmp(&a.2));

        RawOutput::new(vec![
            OutputTensor::new(
                vec![SLOTS, 4],
                slots.iter().flat_map(|(bbox, _, _)| *bbox).collect(),
            ),
            OutputTensor::vector(slots.iter().map(|(_, class, _)| *class).collect()),
            OutputTensor::vector(slots.iter().map(|(_, _, score)| *score).collect()),
            OutputTensor::vector(vec![SLOTS as f32]),
        ])
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new((320, 320))
    }
}

impl InferenceBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn load(&mut self, model_path: &str) -> Result<()> {
        if !model_path.starts_with(SYNTHETIC_MODEL_PREFIX) {
            bail!(
                "synthetic backend only accepts {} model paths, got {}",
                SYNTHETIC_MODEL_PREFIX,
                model_path
            );
        }
        self.loaded = true;
        log::info!(
            "SyntheticBackend: loaded {} ({}x{})",
            model_path,
            self.input.0,
            self.input.1
        );
        Ok(())
    }

    fn input_shape(&self) -> (u32, u32) {
        self.input
    }

    fn invoke(&mut self, input: &Tensor) -> Result<Invocation> {
        if !self.loaded {
            return Err(anyhow!("synthetic model not loaded"));
        }
        if (input.width, input.height) != self.input {
            bail!(
                "tensor size {}x{} does not match model input {}x{}",
                input.width,
                input.height,
                self.input.0,
                self.input.1
            );
        }
        let start = Instant::now();
        let output = Self::candidates(&input.digest());
        Ok(Invocation {
            output,
            elapsed: start.elapsed(),
        })
    }

    fn release(&mut self) {
        if self.loaded {
            log::debug!("SyntheticBackend: released");
        }
        self.loaded = false;
    }
}
