//! Frame to tensor conversion.
//!
//! The preprocessor is a pure function: repack the frame into three channels
//! in the model's order, optionally flip it vertically, then resize it to the
//! model input with nearest-neighbour sampling. Identical frames always give
//! identical tensors.

use std::fmt;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::{ChannelOrder, Frame, Tensor};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreprocessError {
    EmptyFrame { width: u32, height: u32 },
    EmptyTarget { width: u32, height: u32 },
    LengthMismatch { expected: usize, actual: usize },
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessError::EmptyFrame { width, height } => {
                write!(f, "frame has zero area ({}x{})", width, height)
            }
            PreprocessError::EmptyTarget { width, height } => {
                write!(f, "target size has zero area ({}x{})", width, height)
            }
            PreprocessError::LengthMismatch { expected, actual } => write!(
                f,
                "frame length mismatch: expected {} bytes, got {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for PreprocessError {}

/// Turn a captured frame into a tensor of `target` size `(width, height)`.
///
/// `flip_vertical` mirrors the frame top-to-bottom before resizing.
pub fn preprocess(
    frame: &Frame,
    target: (u32, u32),
    order: ChannelOrder,
    flip_vertical: bool,
) -> Result<Tensor, PreprocessError> {
    let (dst_w, dst_h) = target;
    if frame.width == 0 || frame.height == 0 {
        return Err(PreprocessError::EmptyFrame {
            width: frame.width,
            height: frame.height,
        });
    }
    if dst_w == 0 || dst_h == 0 {
        return Err(PreprocessError::EmptyTarget {
            width: dst_w,
            height: dst_h,
        });
    }

    let mut image = ordered_image(frame, order)?;
    if flip_vertical {
        imageops::flip_vertical_in_place(&mut image);
    }
    let image = if image.dimensions() == target {
        image
    } else {
        imageops::resize(&image, dst_w, dst_h, FilterType::Nearest)
    };

    Ok(Tensor::from_parts(dst_w, dst_h, order, image.into_raw()))
}

/// Repack the frame as three interleaved channels in `order`, dropping alpha
/// and expanding gray.
///
/// The buffer holds BGR bytes when `order` is `Bgr`; resampling treats the
/// channels independently so the image type's nominal RGB order is irrelevant.
fn ordered_image(frame: &Frame, order: ChannelOrder) -> Result<RgbImage, PreprocessError> {
    let pixels = frame.pixels();
    let expected = frame.expected_len().ok_or(PreprocessError::EmptyFrame {
        width: frame.width,
        height: frame.height,
    })?;
    if pixels.len() != expected {
        return Err(PreprocessError::LengthMismatch {
            expected,
            actual: pixels.len(),
        });
    }

    let [r, g, b] = frame.layout.rgb_offsets();
    let offsets = match order {
        ChannelOrder::Rgb => [r, g, b],
        ChannelOrder::Bgr => [b, g, r],
    };
    let channels = frame.layout.channels();
    let data: Vec<u8> = if channels == Tensor::CHANNELS && offsets == [0, 1, 2] {
        pixels.to_vec()
    } else {
        pixels
            .chunks_exact(channels)
            .flat_map(|px| offsets.map(|offset| px[offset]))
            .collect()
    };

    let actual = data.len();
    RgbImage::from_raw(frame.width, frame.height, data).ok_or(PreprocessError::LengthMismatch {
        expected,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelLayout;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                // BGR: blue carries x, green carries y, red is constant.
                data.extend([x as u8, y as u8, 200]);
            }
        }
        Frame::new(data, width, height, PixelLayout::Bgr24)
    }

    #[test]
    fn reorders_bgr_to_rgb() {
        let frame = Frame::new(vec![10, 20, 30], 1, 1, PixelLayout::Bgr24);
        let tensor = preprocess(&frame, (1, 1), ChannelOrder::Rgb, false).unwrap();
        assert_eq!(tensor.data(), &[30, 20, 10]);

        let tensor = preprocess(&frame, (1, 1), ChannelOrder::Bgr, false).unwrap();
        assert_eq!(tensor.data(), &[10, 20, 30]);
    }

    #[test]
    fn flip_happens_before_resize() {
        let frame = gradient_frame(2, 4);
        let tensor = preprocess(&frame, (2, 4), ChannelOrder::Rgb, true).unwrap();
        // First output row samples the last source row.
        assert_eq!(&tensor.data()[0..3], &[200, 3, 0]);
        let last_row = 3 * 2 * 3;
        assert_eq!(&tensor.data()[last_row..last_row + 3], &[200, 0, 0]);
    }

    #[test]
    fn downscale_samples_within_each_block() {
        let frame = gradient_frame(8, 8);
        let tensor = preprocess(&frame, (4, 2), ChannelOrder::Bgr, false).unwrap();
        assert_eq!(tensor.shape(), [2, 4, 3]);
        assert_eq!(tensor.order, ChannelOrder::Bgr);
        // Nearest sampling copies source bytes; every output x comes from its
        // own 2-pixel block and every output y from its own 4-row block.
        let xs: Vec<u8> = tensor.data().chunks(3).take(4).map(|px| px[0]).collect();
        for (i, x) in xs.iter().enumerate() {
            assert!((2 * i as u8..2 * i as u8 + 2).contains(x), "x {} -> {}", i, x);
        }
        let ys: Vec<u8> = tensor.data().chunks(3).step_by(4).map(|px| px[1]).collect();
        for (i, y) in ys.iter().enumerate() {
            assert!((4 * i as u8..4 * i as u8 + 4).contains(y), "y {} -> {}", i, y);
        }
        assert!(tensor.data().chunks(3).all(|px| px[2] == 200));
    }

    #[test]
    fn upscale_and_alpha_drop() {
        let frame = Frame::new(vec![1, 2, 3, 255], 1, 1, PixelLayout::Rgba32);
        let tensor = preprocess(&frame, (2, 2), ChannelOrder::Rgb, false).unwrap();
        assert_eq!(tensor.data(), &[1, 2, 3, 1, 2, 3, 1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn gray_expands_to_three_channels() {
        let frame = Frame::new(vec![42], 1, 1, PixelLayout::Gray8);
        let tensor = preprocess(&frame, (1, 1), ChannelOrder::Rgb, true).unwrap();
        assert_eq!(tensor.data(), &[42, 42, 42]);
    }

    #[test]
    fn is_deterministic() {
        let frame = gradient_frame(37, 23);
        let a = preprocess(&frame, (16, 16), ChannelOrder::Rgb, true).unwrap();
        let b = preprocess(&frame, (16, 16), ChannelOrder::Rgb, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn rejects_zero_area() {
        let frame = Frame::new(Vec::new(), 0, 10, PixelLayout::Bgr24);
        assert_eq!(
            preprocess(&frame, (4, 4), ChannelOrder::Rgb, false),
            Err(PreprocessError::EmptyFrame {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn bgra_to_bgr_keeps_order() {
        let frame = Frame::new(vec![1, 2, 3, 9, 4, 5, 6, 9], 2, 1, PixelLayout::Bgra32);
        let tensor = preprocess(&frame, (2, 1), ChannelOrder::Bgr, false).unwrap();
        assert_eq!(tensor.data(), &[1, 2, 3, 4, 5, 6]);
        let tensor = preprocess(&frame, (2, 1), ChannelOrder::Rgb, false).unwrap();
        assert_eq!(tensor.data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn rejects_short_buffer() {
        let frame = Frame::new(vec![0; 5], 2, 1, PixelLayout::Bgr24);
        assert_eq!(
            preprocess(&frame, (4, 4), ChannelOrder::Rgb, false),
            Err(PreprocessError::LengthMismatch {
                expected: 6,
                actual: 5
            })
        );
    }
}
