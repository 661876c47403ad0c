//! Raw backend output to typed detections.
//!
//! The decoder reads the post-processed SSD output layout: a box tensor, an
//! optional class tensor, a score tensor and an optional valid-count tensor.
//! Suppression has already happened upstream; the decoder only filters by
//! score and keeps the backend's ordering.

use std::fmt;

use crate::frame::{OutputTensor, RawOutput};

use super::labels::LabelMap;
use super::result::{BoundingBox, Detection};

/// Coordinate order of each four-value box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoxOrder {
    /// `(ymin, xmin, ymax, xmax)`, the TFLite detection post-process layout.
    #[default]
    YxYx,
    /// `(xmin, ymin, xmax, ymax)`.
    XyXy,
}

/// Position of each tensor in the backend's output list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputSchema {
    pub boxes: usize,
    pub classes: Option<usize>,
    pub scores: usize,
    pub count: Option<usize>,
    pub box_order: BoxOrder,
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self {
            boxes: 0,
            classes: Some(1),
            scores: 2,
            count: Some(3),
            box_order: BoxOrder::YxYx,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    MissingTensor { role: &'static str, index: usize },
    MalformedBoxes { len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingTensor { role, index } => {
                write!(f, "output tensor {} ({}) missing", index, role)
            }
            DecodeError::MalformedBoxes { len } => {
                write!(f, "box tensor length {} is not a multiple of 4", len)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Clone, Debug, Default)]
pub struct DetectionDecoder {
    schema: OutputSchema,
    labels: Option<LabelMap>,
}

impl DetectionDecoder {
    pub fn new(schema: OutputSchema) -> Self {
        Self {
            schema,
            labels: None,
        }
    }

    /// Attach class labels by class id.
    pub fn with_labels(mut self, labels: LabelMap) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Decode every candidate whose score is at least `score_threshold`.
    ///
    /// Returns an empty list when nothing clears the threshold.
    pub fn decode(
        &self,
        output: &RawOutput,
        score_threshold: f32,
    ) -> Result<Vec<Detection>, DecodeError> {
        let boxes = tensor(output, self.schema.boxes, "boxes")?;
        if boxes.data.len() % 4 != 0 {
            return Err(DecodeError::MalformedBoxes {
                len: boxes.data.len(),
            });
        }
        let scores = tensor(output, self.schema.scores, "scores")?;
        let classes = match self.schema.classes {
            Some(index) => Some(tensor(output, index, "classes")?),
            None => None,
        };

        let mut candidates = (boxes.data.len() / 4).min(scores.data.len());
        if let Some(classes) = classes {
            candidates = candidates.min(classes.data.len());
        }
        if let Some(index) = self.schema.count {
            let count = tensor(output, index, "count")?;
            let valid = count.data.first().copied().unwrap_or(0.0);
            candidates = candidates.min(to_index(valid).unwrap_or(0) as usize);
        }

        let mut detections = Vec::new();
        for i in 0..candidates {
            let score = scores.data[i];
            // NaN scores never clear the threshold.
            if !(score >= score_threshold) {
                continue;
            }
            let b = &boxes.data[i * 4..i * 4 + 4];
            let bbox = match self.schema.box_order {
                BoxOrder::YxYx => BoundingBox::from_corners(b[1], b[0], b[3], b[2]),
                BoxOrder::XyXy => BoundingBox::from_corners(b[0], b[1], b[2], b[3]),
            };
            let class_id = classes.and_then(|c| to_index(c.data[i]));
            let label = class_id
                .and_then(|id| self.labels.as_ref().and_then(|labels| labels.get(id)))
                .map(str::to_string);
            detections.push(Detection {
                bbox,
                score,
                class_id,
                label,
            });
        }
        Ok(detections)
    }
}

fn tensor<'a>(
    output: &'a RawOutput,
    index: usize,
    role: &'static str,
) -> Result<&'a OutputTensor, DecodeError> {
    output
        .tensors
        .get(index)
        .ok_or(DecodeError::MissingTensor { role, index })
}

fn to_index(value: f32) -> Option<u32> {
    if value.is_finite() && value >= 0.0 {
        Some(value as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssd_output(boxes: Vec<[f32; 4]>, classes: Vec<f32>, scores: Vec<f32>) -> RawOutput {
        let n = scores.len();
        RawOutput::new(vec![
            OutputTensor::new(vec![n, 4], boxes.into_iter().flatten().collect()),
            OutputTensor::vector(classes),
            OutputTensor::vector(scores),
            OutputTensor::vector(vec![n as f32]),
        ])
    }

    #[test]
    fn filters_below_threshold_and_keeps_order() {
        let output = ssd_output(
            vec![[0.1, 0.2, 0.3, 0.4]; 3],
            vec![0.0, 0.0, 0.0],
            vec![0.9, 0.5, 0.7],
        );
        let detections = DetectionDecoder::default().decode(&output, 0.6).unwrap();
        let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn score_equal_to_threshold_survives() {
        let output = ssd_output(vec![[0.0, 0.0, 1.0, 1.0]], vec![1.0], vec![0.6]);
        let detections = DetectionDecoder::default().decode(&output, 0.6).unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn scores_are_never_clamped_below_threshold() {
        let output = ssd_output(
            vec![[0.0, 0.0, 1.0, 1.0]; 2],
            vec![0.0, 0.0],
            vec![1.3, 1.0],
        );
        let detections = DetectionDecoder::default().decode(&output, 1.2).unwrap();
        let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![1.3]);
    }

    #[test]
    fn empty_when_nothing_clears() {
        let output = ssd_output(
            vec![[0.0, 0.0, 1.0, 1.0]; 2],
            vec![0.0, 1.0],
            vec![0.1, f32::NAN],
        );
        let detections = DetectionDecoder::default().decode(&output, 0.6).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn reads_yxyx_boxes() {
        let output = ssd_output(vec![[0.1, 0.2, 0.5, 0.6]], vec![3.0], vec![0.8]);
        let detection = &DetectionDecoder::default().decode(&output, 0.5).unwrap()[0];
        assert_eq!(
            detection.bbox,
            BoundingBox {
                xmin: 0.2,
                ymin: 0.1,
                xmax: 0.6,
                ymax: 0.5
            }
        );
        assert_eq!(detection.class_id, Some(3));
        assert_eq!(detection.bbox.to_pixels(100, 10), [20, 1, 60, 5]);
    }

    #[test]
    fn valid_count_limits_candidates() {
        let mut output = ssd_output(
            vec![[0.0, 0.0, 1.0, 1.0]; 3],
            vec![0.0, 0.0, 0.0],
            vec![0.9, 0.9, 0.9],
        );
        output.tensors[3] = OutputTensor::vector(vec![2.0]);
        let detections = DetectionDecoder::default().decode(&output, 0.5).unwrap();
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn attaches_labels() {
        let labels = LabelMap::parse("0 person\n1 face\n");
        let decoder = DetectionDecoder::default().with_labels(labels);
        let output = ssd_output(vec![[0.0, 0.0, 1.0, 1.0]], vec![1.0], vec![0.9]);
        let detections = decoder.decode(&output, 0.5).unwrap();
        assert_eq!(detections[0].label.as_deref(), Some("face"));
    }

    #[test]
    fn schema_without_classes_or_count() {
        let schema = OutputSchema {
            boxes: 0,
            classes: None,
            scores: 1,
            count: None,
            box_order: BoxOrder::XyXy,
        };
        let output = RawOutput::new(vec![
            OutputTensor::new(vec![1, 4], vec![0.1, 0.2, 0.3, 0.4]),
            OutputTensor::vector(vec![0.95]),
        ]);
        let detections = DetectionDecoder::new(schema).decode(&output, 0.6).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, None);
        assert_eq!(detections[0].bbox.xmin, 0.1);
    }

    #[test]
    fn missing_tensor_is_an_error() {
        let output = RawOutput::new(vec![OutputTensor::vector(vec![0.0; 4])]);
        assert_eq!(
            DetectionDecoder::default().decode(&output, 0.5),
            Err(DecodeError::MissingTensor {
                role: "scores",
                index: 2
            })
        );
    }

    #[test]
    fn ragged_boxes_are_an_error() {
        let output = RawOutput::new(vec![OutputTensor::vector(vec![0.0; 5])]);
        assert_eq!(
            DetectionDecoder::default().decode(&output, 0.5),
            Err(DecodeError::MalformedBoxes { len: 5 })
        );
    }
}
