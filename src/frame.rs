//! Frame and tensor containers.
//!
//! - `Frame`: one captured image, owned by the loop iteration that captured it.
//! - `Tensor`: model-ready input produced by the preprocessor.
//! - `RawOutput`: the backend's output tensors, interpreted by the decoder.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ----------------------------------------------------------------------------
// Pixel layout
// ----------------------------------------------------------------------------

/// Channel order of a three-channel tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Byte layout of a captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Gray8,
    Rgb24,
    Bgr24,
    Rgba32,
    Bgra32,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb24 | PixelLayout::Bgr24 => 3,
            PixelLayout::Rgba32 | PixelLayout::Bgra32 => 4,
        }
    }

    /// Byte offsets of (red, green, blue) within one pixel.
    ///
    /// Gray frames map every colour to the single luma byte.
    pub(crate) fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelLayout::Gray8 => [0, 0, 0],
            PixelLayout::Rgb24 | PixelLayout::Rgba32 => [0, 1, 2],
            PixelLayout::Bgr24 | PixelLayout::Bgra32 => [2, 1, 0],
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured image. Immutable once produced.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            data,
            width,
            height,
            layout,
            captured_at: Instant::now(),
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Expected buffer length for the frame's dimensions, if it fits in `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(self.layout.channels()))
    }
}

// ----------------------------------------------------------------------------
// Tensor
// ----------------------------------------------------------------------------

/// Quantized HWC input tensor with three channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tensor {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    data: Vec<u8>,
}

impl Tensor {
    pub const CHANNELS: usize = 3;

    pub(crate) fn from_parts(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            order,
            data,
        }
    }

    /// Shape as `[height, width, channels]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.height as usize, self.width as usize, Self::CHANNELS]
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Content digest, used by the synthetic backend and for reproducibility checks.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update([self.order as u8]);
        hasher.update(&self.data);
        hasher.finalize().into()
    }
}

// ----------------------------------------------------------------------------
// Backend output
// ----------------------------------------------------------------------------

/// One output tensor as produced by the backend, flattened to `f32`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Build a one-dimensional tensor.
    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }
}

/// All output tensors of one invocation, in the model's output order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawOutput {
    pub tensors: Vec<OutputTensor>,
}

impl RawOutput {
    pub fn new(tensors: Vec<OutputTensor>) -> Self {
        Self { tensors }
    }
}
