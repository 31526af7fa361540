//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD face detector on RGB video frames: letterbox to the model's
//! 640×640 input, 3-stride anchor decoding, NMS, and mapping back to frame
//! coordinates.

use crate::frame::Frame;
use crate::types::{BoundingBox, Detection, Landmarks};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame too small for detection: {width}x{height}")]
    FrameTooSmall { width: u32, height: u32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector. One instance per loaded model file.
pub struct FaceDetector {
    session: Session,
    input_height: usize,
    input_width: usize,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if num_outputs < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        // Discover output ordering by name. SCRFD exports may name tensors as:
        //   "score_8", "score_16", "score_32" / "bbox_8", "bbox_16", "bbox_32" / "kps_8", ...
        // or as generic integers ("428", "429", ...).
        // Fall back to standard positional ordering when names are not recognized.
        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_height: SCRFD_INPUT_SIZE,
            input_width: SCRFD_INPUT_SIZE,
            stride_indices,
        })
    }

    /// Detect faces in an RGB frame, sorted by descending confidence.
    ///
    /// Candidates scoring at or below `min_confidence` are discarded before NMS.
    /// Landmarks are always decoded; expressions are left empty.
    pub fn detect(&mut self, frame: &Frame, min_confidence: f32) -> Result<Vec<Detection>, DetectorError> {
        if frame.width() < 2 || frame.height() < 2 {
            return Err(DetectorError::FrameTooSmall {
                width: frame.width(),
                height: frame.height(),
            });
        }
        let (input, letterbox) = self.preprocess(
            frame.data(),
            frame.width() as usize,
            frame.height() as usize,
        );

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            let dets = decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                self.input_width,
                self.input_height,
                &letterbox,
                min_confidence,
            );
            all_detections.extend(dets);
        }

        let result = nms(all_detections, SCRFD_NMS_THRESHOLD);
        tracing::trace!(
            faces = result.len(),
            sequence = frame.sequence,
            "SCRFD detection complete"
        );

        Ok(result)
    }
    /// Letterbox an RGB frame into a NCHW float tensor.
    ///
    /// Bilinear resize per channel, centered on a mean-valued canvas so the
    /// padding normalizes to zero.
    fn preprocess(&self, rgb: &[u8], width: usize, height: usize) -> (Array4<f32>, LetterboxInfo) {
        let scale_w = self.input_width as f32 / width as f32;
        let scale_h = self.input_height as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = ((width as f32 * scale).round() as usize).clamp(1, self.input_width);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, self.input_height);
        let pad_x = (self.input_width - new_w) as f32 / 2.0;
        let pad_y = (self.input_height - new_h) as f32 / 2.0;

        let letterbox = LetterboxInfo { scale, pad_x, pad_y };
        let resized = resize_rgb_bilinear(rgb, width, height, new_w, new_h);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::from_elem((1, 3, self.input_height, self.input_width), 0.0);

        for y in 0..new_h {
            for x in 0..new_w {
                let src = (y * new_w + x) * 3;
                let (ty, tx) = (y + pad_y_start, x + pad_x_start);
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = (resized[src + c] as f32 - SCRFD_MEAN) / SCRFD_STD;
                }
            }
        }

        (tensor, letterbox)
    }
}

/// Bilinear resize of packed RGB24 data.
fn resize_rgb_bilinear(rgb: &[u8], width: usize, height: usize, new_w: usize, new_h: usize) -> Vec<u8> {
    let inv_scale_x = width as f32 / new_w as f32;
    let inv_scale_y = height as f32 / new_h as f32;
    let mut resized = vec![0u8; new_w * new_h * 3];

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let tl = rgb[(y0 * width + x0) * 3 + c] as f32;
                let tr = rgb[(y0 * width + x1) * 3 + c] as f32;
                let bl = rgb[(y1 * width + x0) * 3 + c] as f32;
                let br = rgb[(y1 * width + x1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[(y * new_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    resized
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports either name their outputs ("score_8", "bbox_16", "kps_32", ...)
/// or use generic numeric names. Named outputs are mapped to stride slots;
/// anything else falls back to the standard positional ordering:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(found) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes, [6-8]=kps"
            );
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Decode detections for a single stride level.
#[allow(clippy::too_many_arguments)]
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    input_width: usize,
    input_height: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Detection> {
    let grid_h = input_height / stride;
    let grid_w = input_width / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let stride_f = stride as f32;

    let unletterbox = |x: f32, y: f32| -> (f32, f32) {
        (
            (x - letterbox.pad_x) / letterbox.scale,
            (y - letterbox.pad_y) / letterbox.scale,
        )
    };

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * stride_f;
        let anchor_cy = (anchor_idx / grid_w) as f32 * stride_f;

        // Distances to the four box edges, in stride units.
        let bbox_off = idx * 4;
        let Some(dist) = bboxes.get(bbox_off..bbox_off + 4) else {
            continue;
        };
        let (x1, y1) = unletterbox(anchor_cx - dist[0] * stride_f, anchor_cy - dist[1] * stride_f);
        let (x2, y2) = unletterbox(anchor_cx + dist[2] * stride_f, anchor_cy + dist[3] * stride_f);

        let kps_off = idx * 10;
        let landmarks: Option<Landmarks> = kps.get(kps_off..kps_off + 10).map(|offsets| {
            std::array::from_fn(|i| {
                unletterbox(
                    anchor_cx + offsets[i * 2] * stride_f,
                    anchor_cy + offsets[i * 2 + 1] * stride_f,
                )
            })
        });

        detections.push(Detection {
            bounding_box: BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            },
            landmarks,
            expressions: None,
        });
    }

    detections
}

/// Non-Maximum Suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.bounding_box
            .confidence
            .partial_cmp(&a.bounding_box.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let overlaps = keep
            .iter()
            .any(|kept| iou(&kept.bounding_box, &candidate.bounding_box) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }

    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.area() + b.area() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_face(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Detection {
        Detection {
            bounding_box: BoundingBox { x, y, width: w, height: h, confidence: conf },
            landmarks: None,
            expressions: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_face(0.0, 0.0, 100.0, 100.0, 1.0).bounding_box;
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_face(0.0, 0.0, 10.0, 10.0, 1.0).bounding_box;
        let b = make_face(20.0, 20.0, 10.0, 10.0, 1.0).bounding_box;
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_face(0.0, 0.0, 10.0, 10.0, 1.0).bounding_box;
        let b = make_face(5.0, 0.0, 10.0, 10.0, 1.0).bounding_box;
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping_and_sorts() {
        let detections = vec![
            make_face(200.0, 200.0, 50.0, 50.0, 0.7),
            make_face(5.0, 5.0, 100.0, 100.0, 0.8),
            make_face(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].bounding_box.confidence - 0.9).abs() < 1e-6);
        assert!((result[1].bounding_box.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_decode_stride_maps_back_through_letterbox() {
        // One anchor above threshold at grid cell (1, 2) of stride 32 on a 64x64 input.
        let stride = 32;
        let (input_w, input_h) = (64, 64);
        let cells = (input_w / stride) * (input_h / stride);
        let mut scores = vec![0.0f32; cells * SCRFD_ANCHORS_PER_CELL];
        // cell index = row 1 * 2 cols + col 0 = 2 → anchor idx 4
        scores[4] = 0.9;
        let mut bboxes = vec![0.0f32; scores.len() * 4];
        bboxes[16..20].copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);
        let kps = vec![0.0f32; scores.len() * 10];

        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 8.0 };
        let dets = decode_stride(&scores, &bboxes, &kps, stride, input_w, input_h, &letterbox, 0.5);
        assert_eq!(dets.len(), 1);

        // Anchor at (0, 32): box (-16, 16)-(16, 48) in input space → /2 after unpadding.
        let b = dets[0].bounding_box;
        assert!((b.x - -8.0).abs() < 1e-4, "x = {}", b.x);
        assert!((b.y - 4.0).abs() < 1e-4, "y = {}", b.y);
        assert!((b.width - 16.0).abs() < 1e-4);
        assert!((b.height - 16.0).abs() < 1e-4);
        let lms = dets[0].landmarks.expect("landmarks decoded");
        assert!((lms[0].0 - 0.0).abs() < 1e-4 && (lms[0].1 - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stride_threshold_is_exclusive() {
        let scores = vec![0.5f32; 2 * 2 * SCRFD_ANCHORS_PER_CELL];
        let bboxes = vec![1.0f32; scores.len() * 4];
        let kps = vec![0.0f32; scores.len() * 10];
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let dets = decode_stride(&scores, &bboxes, &kps, 32, 64, 64, &letterbox, 0.5);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_letterbox_coordinate_roundtrip() {
        let (width, height) = (320.0f32, 240.0f32);
        let scale = (640.0 / width).min(640.0 / height);
        let pad_x = (640.0 - (width * scale).round()) / 2.0;
        let pad_y = (640.0 - (height * scale).round()) / 2.0;

        let (orig_x, orig_y) = (100.0f32, 50.0f32);
        let recovered_x = (orig_x * scale + pad_x - pad_x) / scale;
        let recovered_y = (orig_y * scale + pad_y - pad_y) / scale;

        assert!((recovered_x - orig_x).abs() < 0.1, "x: {recovered_x} vs {orig_x}");
        assert!((recovered_y - orig_y).abs() < 0.1, "y: {recovered_y} vs {orig_y}");
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32",
            "bbox_8",  "bbox_16",  "bbox_32",
            "kps_8",   "kps_16",   "kps_32",
        ].iter().map(|s| s.to_string()).collect();

        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let frame = vec![128u8; 100 * 50 * 3];
        let resized = resize_rgb_bilinear(&frame, 100, 50, 200, 100);
        assert_eq!(resized.len(), 200 * 100 * 3);
        assert!(resized.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_resize_keeps_channels_separate() {
        let frame: Vec<u8> = [10u8, 200, 90].repeat(4 * 4);
        let resized = resize_rgb_bilinear(&frame, 4, 4, 2, 2);
        for px in resized.chunks_exact(3) {
            assert_eq!(px, &[10, 200, 90]);
        }
    }
}
