use std::time::Duration;

use anyhow::Result;

use crate::frame::{RawOutput, Tensor};

/// Result of one backend invocation.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    pub output: RawOutput,
    /// Wall time the backend spent executing the model.
    pub elapsed: Duration,
}

/// Model execution on an accelerator.
///
/// The capture loop calls `load` once during startup, `invoke` once per
/// captured frame, and `release` exactly once on shutdown, whether or not
/// `load` succeeded.
///
/// Implementations must treat the input tensor as read-only and must not keep
/// it beyond the `invoke` call.
pub trait InferenceBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Load the model and prepare it for execution.
    fn load(&mut self, model_path: &str) -> Result<()>;

    /// Input size the loaded model expects, as `(width, height)`.
    fn input_shape(&self) -> (u32, u32);

    /// Run the model on one tensor and report how long it took.
    fn invoke(&mut self, input: &Tensor) -> Result<Invocation>;

    /// Release the accelerator. Called even when `load` failed.
    fn release(&mut self) {}
}
