pub mod synthetic;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::Result;

use crate::detect::backend::{InferenceBackend, Invocation};
use crate::frame::Tensor;

pub use synthetic::{SyntheticBackend, SYNTHETIC_MODEL_PREFIX};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Backend chosen from the configured model path.
///
/// `stub://` paths select the synthetic backend; anything else is treated as an
/// ONNX model file for the tract backend.
pub struct AcceleratorBackend {
    inner: BackendKind,
}

enum BackendKind {
    Synthetic(SyntheticBackend),
    #[cfg(feature = "backend-tract")]
    Tract(TractBackend),
}

impl AcceleratorBackend {
    /// `input` is the model input size used when the model itself cannot report one.
    pub fn for_model(model_path: &str, input: (u32, u32)) -> Result<Self> {
        if model_path.starts_with(SYNTHETIC_MODEL_PREFIX) {
            Ok(Self {
                inner: BackendKind::Synthetic(SyntheticBackend::new(input)),
            })
        } else {
            #[cfg(feature = "backend-tract")]
            {
                Ok(Self {
                    inner: BackendKind::Tract(TractBackend::new(input.0, input.1)),
                })
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                anyhow::bail!(
                    "model {} requires the backend-tract feature (or use a {} path)",
                    model_path,
                    SYNTHETIC_MODEL_PREFIX
                )
            }
        }
    }

    fn backend(&mut self) -> &mut dyn InferenceBackend {
        match &mut self.inner {
            BackendKind::Synthetic(backend) => backend,
            #[cfg(feature = "backend-tract")]
            BackendKind::Tract(backend) => backend,
        }
    }
}

impl InferenceBackend for AcceleratorBackend {
    fn name(&self) -> &'static str {
        match &self.inner {
            BackendKind::Synthetic(backend) => backend.name(),
            #[cfg(feature = "backend-tract")]
            BackendKind::Tract(backend) => backend.name(),
        }
    }

    fn load(&mut self, model_path: &str) -> Result<()> {
        self.backend().load(model_path)
    }

    fn input_shape(&self) -> (u32, u32) {
        match &self.inner {
            BackendKind::Synthetic(backend) => backend.input_shape(),
            #[cfg(feature = "backend-tract")]
            BackendKind::Tract(backend) => backend.input_shape(),
        }
    }

    fn invoke(&mut self, input: &Tensor) -> Result<Invocation> {
        self.backend().invoke(input)
    }

    fn release(&mut self) {
        self.backend().release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_paths_select_synthetic_backend() -> Result<()> {
        let mut backend = AcceleratorBackend::for_model("stub://faces", (300, 300))?;
        assert_eq!(backend.name(), "synthetic");
        assert_eq!(backend.input_shape(), (300, 300));
        backend.load("stub://faces")?;
        backend.release();
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn model_files_require_tract_feature() {
        assert!(AcceleratorBackend::for_model("face.onnx", (320, 320)).is_err());
    }
}
