//! ONNX YOLOv8 inference for UI element detection.
//!
//! Loads an ultralytics YOLOv8 export and turns one screenshot into raw
//! detections in absolute pixel coordinates.

use std::path::Path;

use image::{imageops, DynamicImage, Rgb, RgbImage};
use ndarray::{s, Array4, ArrayViewD, Axis, Ix3};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::config::DetectorConfig;
use crate::errors::{VisionDomError, VisionDomResult};
use crate::perception::types::{BoundingBox, RawDetection};

/// Letterbox fill value used by ultralytics exports.
const PAD_GREY: u8 = 114;

/// Single-image object detection. Implementations must not assume any
/// output ordering is relied upon by callers.
pub trait ElementDetector: Send {
    fn detect(&mut self, image: &DynamicImage) -> VisionDomResult<Vec<RawDetection>>;
}

/// Letterbox geometry needed to map model space back to the screenshot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Letterbox {
    pub pad_x: f32,
    pub pad_y: f32,
    pub scale: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Holds the ONNX Runtime session and inference configuration.
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloDetector {
    /// Load the weights at `model_path`. A missing or unloadable file is a
    /// `ModelLoad` error.
    pub fn new(model_path: &Path, config: &DetectorConfig) -> VisionDomResult<Self> {
        if !model_path.exists() {
            return Err(VisionDomError::ModelLoad(format!(
                "detector weights not found at {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionDomError::ModelLoad(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionDomError::ModelLoad(format!("ort opt-level: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                VisionDomError::ModelLoad(format!("ort load {}: {e}", model_path.display()))
            })?;

        tracing::info!(
            path = %model_path.display(),
            classes = config.class_names.len(),
            "UI detector loaded"
        );

        Ok(Self {
            session,
            input_size: config.input_size,
            conf_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            class_names: config.class_names.clone(),
        })
    }

    pub fn from_config(config: &DetectorConfig) -> VisionDomResult<Self> {
        Self::new(&config.model_path, config)
    }

    /// Fit `img` into the square model input, centred on grey padding.
    fn letterbox(&self, img: &DynamicImage) -> (RgbImage, Letterbox) {
        let side = self.input_size;
        let (w, h) = (img.width(), img.height());
        let scale = (side as f32 / w as f32).min(side as f32 / h as f32);
        let fit = |v: u32| ((v as f32 * scale).round() as u32).clamp(1, side);
        let (fw, fh) = (fit(w), fit(h));

        let lb = Letterbox {
            pad_x: (side - fw) as f32 / 2.0,
            pad_y: (side - fh) as f32 / 2.0,
            scale,
            orig_w: w,
            orig_h: h,
        };

        let scaled = img
            .resize_exact(fw, fh, imageops::FilterType::CatmullRom)
            .into_rgb8();
        let mut square = RgbImage::from_pixel(side, side, Rgb([PAD_GREY; 3]));
        imageops::overlay(
            &mut square,
            &scaled,
            lb.pad_x.round() as i64,
            lb.pad_y.round() as i64,
        );
        (square, lb)
    }
}

/// HWC u8 → NCHW f32 in `[0, 1]`.
fn to_nchw(square: &RgbImage) -> Array4<f32> {
    let (w, h) = (square.width() as usize, square.height() as usize);
    Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
        square.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

impl ElementDetector for YoloDetector {
    fn detect(&mut self, image: &DynamicImage) -> VisionDomResult<Vec<RawDetection>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (square, letterbox) = self.letterbox(image);
        let input = Tensor::from_array(to_nchw(&square))
            .map_err(|e| VisionDomError::Inference(format!("input tensor: {e}")))?;

        let raw = {
            let outputs = self
                .session
                .run(ort::inputs![input])
                .map_err(|e| VisionDomError::Inference(format!("detector run: {e}")))?;
            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| VisionDomError::Inference(format!("detector output: {e}")))?
                .to_owned()
        };

        let detections = postprocess(
            &raw.view(),
            letterbox,
            self.conf_threshold,
            self.iou_threshold,
            &self.class_names,
        )?;
        tracing::debug!(count = detections.len(), "detector pass finished");
        Ok(detections)
    }
}

struct Candidate {
    bbox: BoundingBox,
    confidence: f32,
    class_id: usize,
}

/// Decode a YOLOv8 `[1, 4 + classes, proposals]` output.
pub(crate) fn postprocess(
    output: &ArrayViewD<f32>,
    lb: Letterbox,
    conf_threshold: f32,
    iou_threshold: f32,
    class_names: &[String],
) -> VisionDomResult<Vec<RawDetection>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(VisionDomError::Inference(format!(
            "detector output has shape {shape:?}, expected [1, 4 + classes, proposals]"
        )));
    }
    let output = output
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|e| VisionDomError::Inference(format!("detector output: {e}")))?;
    let table = output.index_axis(Axis(0), 0);
    let (max_x, max_y) = (lb.orig_w as f64, lb.orig_h as f64);
    let unpad = |v: f32, pad: f32, max: f64| (((v - pad) / lb.scale) as f64).clamp(0.0, max);

    let mut candidates: Vec<Candidate> = table
        .axis_iter(Axis(1))
        .filter_map(|p| {
            let (class_id, confidence) = p
                .slice(s![4..])
                .iter()
                .copied()
                .enumerate()
                .fold((0usize, 0.0f32), |best, (c, score)| {
                    if score > best.1 {
                        (c, score)
                    } else {
                        best
                    }
                });
            if confidence < conf_threshold {
                return None;
            }
            let (cx, cy, w, h) = (p[0], p[1], p[2], p[3]);
            let bbox = BoundingBox::new(
                unpad(cx - w / 2.0, lb.pad_x, max_x),
                unpad(cy - h / 2.0, lb.pad_y, max_y),
                unpad(cx + w / 2.0, lb.pad_x, max_x),
                unpad(cy + h / 2.0, lb.pad_y, max_y),
            );
            Some(Candidate {
                bbox,
                confidence,
                class_id,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let kept = suppress_overlaps(candidates, iou_threshold as f64);

    Ok(kept
        .into_iter()
        .map(|c| {
            let class_name = c.class_id.to_string();
            let semantic_name = class_names
                .get(c.class_id)
                .cloned()
                .unwrap_or_else(|| class_name.clone());
            RawDetection {
                bounding_box: c.bbox,
                semantic_name,
                class_name,
                confidence: c.confidence,
            }
        })
        .collect())
}

/// Greedy per-class NMS over confidence-sorted candidates.
fn suppress_overlaps(sorted: Vec<Candidate>, iou_threshold: f64) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::with_capacity(sorted.len());
    for c in sorted {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == c.class_id && k.bbox.iou(&c.bbox) > iou_threshold);
        if !overlaps {
            kept.push(c);
        }
    }
    kept
}
