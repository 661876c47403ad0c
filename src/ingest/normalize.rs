use anyhow::{anyhow, Result};

/// Drop per-row padding from a strided buffer.
///
/// Returns `None` when the buffer is too short for `height` rows of
/// `row_bytes` at `stride`.
pub(crate) fn pack_rows(
    buf: &[u8],
    stride: usize,
    row_bytes: usize,
    height: usize,
) -> Option<Vec<u8>> {
    if stride < row_bytes {
        return None;
    }
    if stride == row_bytes {
        let len = row_bytes.checked_mul(height)?;
        return buf.get(..len).map(<[u8]>::to_vec);
    }
    let needed = stride.checked_mul(height.checked_sub(1)?)?.checked_add(row_bytes)?;
    if buf.len() < needed {
        return None;
    }
    let mut packed = Vec::with_capacity(row_bytes * height);
    for row in buf.chunks(stride).take(height) {
        packed.extend_from_slice(&row[..row_bytes]);
    }
    Some(packed)
}

/// Convert packed YUYV 4:2:2 to interleaved RGB (BT.601, full range).
pub(crate) fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frame width {} is odd", width));
    }
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(2))
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(expected / 2 * 3);
    for macro_pixel in pixels.chunks_exact(4) {
        let u = macro_pixel[1] as f32 - 128.0;
        let v = macro_pixel[3] as f32 - 128.0;
        for y in [macro_pixel[0], macro_pixel[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
