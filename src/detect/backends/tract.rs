#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceBackend, Invocation};
use crate::frame::{OutputTensor, RawOutput, Tensor};

type Plan = TypedRunnableModel<TypedModel>;

/// Tract-based backend for ONNX detection models.
///
/// The model must take a `1x3xHxW` f32 input scaled to `[0, 1]` and emit the
/// post-processed detection tensors (boxes, classes, scores, count). Every
/// output is handed to the decoder as flattened `f32`. `H` and `W` come from
/// the model when it declares them; the configured size is used only for
/// models with a symbolic input shape.
pub struct TractBackend {
    model: Option<Plan>,
    width: u32,
    height: u32,
}

impl TractBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            model: None,
            width,
            height,
        }
    }

    fn build_input(&self, input: &Tensor) -> Result<tract_onnx::prelude::Tensor> {
        if input.width != self.width || input.height != self.height {
            return Err(anyhow!(
                "tensor size {}x{} does not match model input {}x{}",
                input.width,
                input.height,
                self.width,
                self.height
            ));
        }
        let width = input.width as usize;
        let pixels = input.data();
        let array = tract_ndarray::Array4::from_shape_fn(
            (1, 3, input.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        Ok(array.into_tensor())
    }

    fn collect_outputs(outputs: TVec<TValue>) -> Result<RawOutput> {
        let mut tensors = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.iter().enumerate() {
            let output = output
                .cast_to::<f32>()
                .with_context(|| format!("output {} is not numeric", index))?;
            let view = output.to_array_view::<f32>()?;
            tensors.push(OutputTensor::new(
                view.shape().to_vec(),
                view.iter().copied().collect(),
            ));
        }
        Ok(RawOutput::new(tensors))
    }
}

/// `(width, height)` of a concrete `[1, 3, H, W]` input shape.
fn nchw_size(dims: &[usize]) -> Result<(u32, u32)> {
    match dims {
        [1, 3, height, width] if *height > 0 && *width > 0 => Ok((
            u32::try_from(*width).context("model input width out of range")?,
            u32::try_from(*height).context("model input height out of range")?,
        )),
        _ => bail!("model input shape {:?} is not 1x3xHxW", dims),
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self, model_path: &str) -> Result<()> {
        let path = Path::new(model_path);
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?;

        let declared = model
            .input_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete_finite().ok().flatten());
        match declared.as_deref().map(nchw_size).transpose()? {
            Some((width, height)) => {
                log::info!("TractBackend: model declares input {}x{}", width, height);
                self.width = width;
                self.height = height;
            }
            None => log::info!(
                "TractBackend: model input is symbolic, using {}x{}",
                self.width,
                self.height
            ),
        }

        let model = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, self.height as usize, self.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        self.model = Some(model);
        log::info!(
            "TractBackend: loaded {} ({}x{})",
            path.display(),
            self.width,
            self.height
        );
        Ok(())
    }

    fn input_shape(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn invoke(&mut self, input: &Tensor) -> Result<Invocation> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("ONNX model not loaded"))?;
        let input = self.build_input(input)?;
        let start = Instant::now();
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let elapsed = start.elapsed();
        Ok(Invocation {
            output: Self::collect_outputs(outputs)?,
            elapsed,
        })
    }

    fn release(&mut self) {
        if self.model.take().is_some() {
            log::debug!("TractBackend: released");
        }
    }
}
