/// Axis-aligned box in normalized `[0, 1]` coordinates of the model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    /// Build a box from possibly unordered, possibly out-of-range corners.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let clamp = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let (x0, x1) = (clamp(x0), clamp(x1));
        let (y0, y1) = (clamp(y0), clamp(y1));
        Self {
            xmin: x0.min(x1),
            ymin: y0.min(y1),
            xmax: x0.max(x1),
            ymax: y0.max(y1),
        }
    }

    /// Scale to pixel coordinates of an image of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> [u32; 4] {
        let w = width as f32;
        let h = height as f32;
        [
            (self.xmin * w).round() as u32,
            (self.ymin * h).round() as u32,
            (self.xmax * w).round() as u32,
            (self.ymax * h).round() as u32,
        ]
    }
}

/// One decoded candidate that cleared the score threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: Option<u32>,
    pub label: Option<String>,
}
