//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free decoding over three stride levels with NMS post-processing.
//! Operates on prepared grayscale images; the single channel is replicated
//! into the three-channel input the model expects.

use crate::face::FaceError;
use crate::preprocess::{resize_bilinear, PreparedImage};
use crate::types::FaceBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Detection thresholds, tunable without touching the model.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Minimum per-anchor score to keep a detection.
    pub confidence_threshold: f32,
    /// IoU above which overlapping detections are suppressed.
    pub nms_iou: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_iou: 0.4,
        }
    }
}

/// Letterbox geometry mapping model-input coordinates back to the source.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> (Self, usize, usize) {
        let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
        let new_w = (src_w as f32 * scale).round() as usize;
        let new_h = (src_h as f32 * scale).round() as usize;
        let letterbox = Self {
            scale,
            pad_x: (dst_w - new_w) as f32 / 2.0,
            pad_y: (dst_h - new_h) as f32 / 2.0,
        };
        (letterbox, new_w, new_h)
    }

    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score, bbox, kps).
type StrideIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    config: DetectorConfig,
    /// Per-stride output indices for strides [8, 16, 32], discovered by
    /// name at load time with a positional fallback.
    stride_indices: [StrideIndices; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str, config: DetectorConfig) -> Result<Self, FaceError> {
        if !Path::new(model_path).exists() {
            return Err(FaceError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(FaceError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides x score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            config,
            stride_indices,
        })
    }

    /// Detect faces, returning boxes sorted by confidence descending.
    pub fn detect(&mut self, image: &PreparedImage) -> Result<Vec<FaceBox>, FaceError> {
        let (input, letterbox) = build_input(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[level];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            detections.extend(decode_level(
                scores,
                bboxes,
                kps,
                stride,
                &letterbox,
                self.config.confidence_threshold,
            ));
        }

        let mut kept = suppress_overlaps(detections, self.config.nms_iou);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }
}

/// Resize with letterbox padding and normalize into the NCHW model input.
/// The pad value equals the model mean so padding normalizes to zero.
fn build_input(image: &PreparedImage) -> (Array4<f32>, Letterbox) {
    let src_w = image.width() as usize;
    let src_h = image.height() as usize;
    let (letterbox, new_w, new_h) = Letterbox::fit(src_w, src_h, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE);

    let resized = resize_bilinear(image.pixels(), src_w, src_h, new_w, new_h);
    let pad_x = letterbox.pad_x.floor() as usize;
    let pad_y = letterbox.pad_y.floor() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    for y in 0..SCRFD_INPUT_SIZE {
        for x in 0..SCRFD_INPUT_SIZE {
            let pixel = if y >= pad_y && y < pad_y + new_h && x >= pad_x && x < pad_x + new_w {
                resized[(y - pad_y) * new_w + (x - pad_x)] as f32
            } else {
                SCRFD_MEAN
            };
            let normalized = (pixel - SCRFD_MEAN) / SCRFD_STD;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    (tensor, letterbox)
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports may name tensors "score_8"/"bbox_16"/"kps_32" or use
/// generic numeric names; the latter fall back to the standard positional
/// ordering [0-2]=scores, [3-5]=bboxes, [6-8]=kps.
fn discover_output_indices(names: &[String]) -> [StrideIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut named = [(0usize, 0usize, 0usize); 3];
    for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (
            find("score", stride),
            find("bbox", stride),
            find("kps", stride),
        ) {
            (Some(s), Some(b), Some(k)) => named[level] = (s, b, k),
            _ => {
                tracing::info!(
                    ?names,
                    "SCRFD output names not recognized, using positional mapping"
                );
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    named
}

/// Decode detections for a single stride level back into source space.
fn decode_level(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (cell % grid) as f32 * stride as f32;
        let anchor_cy = (cell / grid) as f32 * stride as f32;

        // bbox offsets are [left, top, right, bottom] distances in strides.
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let (x1, y1) = letterbox.to_source(
            anchor_cx - bboxes[off] * stride as f32,
            anchor_cy - bboxes[off + 1] * stride as f32,
        );
        let (x2, y2) = letterbox.to_source(
            anchor_cx + bboxes[off + 2] * stride as f32,
            anchor_cy + bboxes[off + 3] * stride as f32,
        );

        let kps_off = idx * 10;
        let landmarks = if kps_off + 9 < kps.len() {
            let mut points = [(0.0f32, 0.0f32); 5];
            for (i, point) in points.iter_mut().enumerate() {
                *point = letterbox.to_source(
                    anchor_cx + kps[kps_off + i * 2] * stride as f32,
                    anchor_cy + kps[kps_off + i * 2 + 1] * stride as f32,
                );
            }
            Some(points)
        } else {
            None
        };

        detections.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-maximum suppression: drop detections overlapping a higher-scoring
/// one beyond the IoU threshold.
fn suppress_overlaps(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());
        for j in (i + 1)..detections.len() {
            if !suppressed[j] && overlap_ratio(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// Intersection-over-union of two face boxes.
fn overlap_ratio(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
