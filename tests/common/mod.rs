//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use vision_dom::ocr::{BackendFactory, BackendKind, EnricherPool, TextBackend};
use vision_dom::perception::types::{BoundingBox, RawDetection};
use vision_dom::perception::yolo_detector::ElementDetector;
use vision_dom::{VisionDomError, VisionDomResult};

/// Returns the same detections for every frame.
pub struct ScriptedDetector(pub Vec<RawDetection>);

impl ElementDetector for ScriptedDetector {
    fn detect(&mut self, _image: &DynamicImage) -> VisionDomResult<Vec<RawDetection>> {
        Ok(self.0.clone())
    }
}

/// Reads a label out of a lookup keyed by region size.
pub struct SizeLookupBackend {
    pub name: &'static str,
    pub labels: Vec<((u32, u32), Vec<String>)>,
}

impl TextBackend for SizeLookupBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&mut self, region: &RgbImage, _language: &str) -> VisionDomResult<Vec<String>> {
        let size = region.dimensions();
        Ok(self
            .labels
            .iter()
            .find(|(s, _)| *s == size)
            .map(|(_, lines)| lines.clone())
            .unwrap_or_default())
    }
}

/// Paddle is reported as not installed; ocrs answers from `labels`.
pub struct OcrsOnlyFactory {
    pub labels: Vec<((u32, u32), Vec<String>)>,
}

impl BackendFactory for OcrsOnlyFactory {
    fn create(&self, kind: BackendKind, _language: &str) -> VisionDomResult<Box<dyn TextBackend>> {
        match kind {
            BackendKind::Paddle => Err(VisionDomError::BackendUnavailable(
                "paddle models not installed".into(),
            )),
            BackendKind::Ocrs => Ok(Box::new(SizeLookupBackend {
                name: "ocrs",
                labels: self.labels.clone(),
            })),
        }
    }
}

pub fn pool(labels: Vec<((u32, u32), Vec<String>)>) -> EnricherPool {
    EnricherPool::new(
        Arc::new(OcrsOnlyFactory { labels }),
        BackendKind::Paddle,
        BackendKind::Ocrs,
        "ch",
    )
}

pub fn detection(x1: f64, y1: f64, x2: f64, y2: f64, name: &str, confidence: f32) -> RawDetection {
    RawDetection {
        bounding_box: BoundingBox::new(x1, y1, x2, y2),
        semantic_name: name.into(),
        class_name: "0".into(),
        confidence,
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([250, 250, 250])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}
