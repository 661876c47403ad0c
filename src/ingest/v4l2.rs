//! V4L2 camera source.
//!
//! Opens `/dev/video{index}`, negotiates a BGR format where the driver allows
//! it, and streams frames through memory-mapped buffers. YUYV cameras are
//! converted to RGB on capture and row padding is stripped. Capture errors and
//! buffers of the wrong size are reported as missing frames; the capture loop
//! decides what to do with them.

use anyhow::{bail, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{pack_rows, yuyv_to_rgb};
use super::{CaptureSize, FrameSource, SourceStats};
use crate::frame::{Frame, PixelLayout};

const STREAM_BUFFERS: u32 = 4;

pub struct DeviceSource {
    size: CaptureSize,
    state: Option<DeviceState>,
    device_index: Option<u32>,
    format: WireFormat,
    active_width: u32,
    active_height: u32,
    stride: usize,
    stats: SourceStats,
}

/// Pixel format as delivered by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WireFormat {
    Packed(PixelLayout),
    Yuyv,
}

impl WireFormat {
    fn bytes_per_pixel(self) -> usize {
        match self {
            WireFormat::Packed(layout) => layout.channels(),
            WireFormat::Yuyv => 2,
        }
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceSource {
    pub fn new(size: CaptureSize) -> Self {
        Self {
            size,
            state: None,
            device_index: None,
            format: WireFormat::Packed(PixelLayout::Bgr24),
            active_width: size.width,
            active_height: size.height,
            stride: size.width as usize * 3,
            stats: SourceStats::default(),
        }
    }

    /// Turn one driver buffer into a frame, or `None` if it is not a whole
    /// frame in the negotiated format.
    fn decode_buffer(&self, buf: &[u8]) -> Option<Frame> {
        let width = self.active_width;
        let height = self.active_height;
        let row_bytes = width as usize * self.format.bytes_per_pixel();
        let Some(packed) = pack_rows(buf, self.stride, row_bytes, height as usize) else {
            log::debug!(
                "DeviceSource: short buffer ({} bytes for {}x{}, stride {})",
                buf.len(),
                width,
                height,
                self.stride
            );
            return None;
        };
        match self.format {
            WireFormat::Packed(layout) => Some(Frame::new(packed, width, height, layout)),
            WireFormat::Yuyv => match yuyv_to_rgb(&packed, width, height) {
                Ok(rgb) => Some(Frame::new(rgb, width, height, PixelLayout::Rgb24)),
                Err(err) => {
                    log::debug!("DeviceSource: {}", err);
                    None
                }
            },
        }
    }
}

fn wire_format_for(fourcc: &v4l::FourCC) -> Option<WireFormat> {
    match &fourcc.repr {
        b"BGR3" => Some(WireFormat::Packed(PixelLayout::Bgr24)),
        b"RGB3" => Some(WireFormat::Packed(PixelLayout::Rgb24)),
        b"GREY" => Some(WireFormat::Packed(PixelLayout::Gray8)),
        b"YUYV" => Some(WireFormat::Yuyv),
        _ => None,
    }
}

impl FrameSource for DeviceSource {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open(&mut self, device_index: u32) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::new(device_index as usize)
            .with_context(|| format!("open v4l2 device /dev/video{}", device_index))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.size.width;
        format.height = self.size.height;
        format.fourcc = v4l::FourCC::new(b"BGR3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "DeviceSource: failed to set format on /dev/video{}: {}",
                    device_index,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let Some(wire) = wire_format_for(&format.fourcc) else {
            bail!(
                "/dev/video{} negotiated unsupported pixel format {}",
                device_index,
                format.fourcc
            );
        };

        let row_bytes = format.width as usize * wire.bytes_per_pixel();
        self.format = wire;
        self.active_width = format.width;
        self.active_height = format.height;
        self.stride = (format.stride as usize).max(row_bytes);
        self.device_index = Some(device_index);

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "DeviceSource: opened /dev/video{} ({}x{} {})",
            device_index,
            self.active_width,
            self.active_height,
            format.fourcc
        );
        Ok(())
    }

    fn capture(&mut self) -> Option<Frame> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            self.stats.misses += 1;
            return None;
        };
        let pixels = match state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map(|(buf, meta)| buf[..(meta.bytesused as usize).min(buf.len())].to_vec())
        }) {
            Ok(pixels) => pixels,
            Err(err) => {
                log::debug!("DeviceSource: capture failed: {}", err);
                self.stats.misses += 1;
                return None;
            }
        };
        match self.decode_buffer(&pixels) {
            Some(frame) => {
                self.stats.frames_captured += 1;
                Some(frame)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            if let Some(index) = self.device_index {
                log::debug!("DeviceSource: released /dev/video{}", index);
            }
        }
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
