//! PP-OCR text recognition through ONNX Runtime.
//!
//! Each language lives in its own directory holding the exported recognition
//! head (`rec.onnx`) and its character list (`dict.txt`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::RgbImage;
use ndarray::{Array4, Ix3};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use crate::errors::{VisionDomError, VisionDomResult};
use crate::ocr::ctc::CtcDecoder;
use crate::ocr::lines::split_lines;
use crate::ocr::TextBackend;

const REC_HEIGHT: u32 = 48;
const REC_MAX_WIDTH: u32 = 3200;
const REC_MODEL_FILE: &str = "rec.onnx";
const REC_DICT_FILE: &str = "dict.txt";

struct Recognizer {
    session: Session,
    decoder: CtcDecoder,
}

impl Recognizer {
    fn load(dir: &Path, use_space_char: bool) -> VisionDomResult<Self> {
        let model = dir.join(REC_MODEL_FILE);
        let dict = dir.join(REC_DICT_FILE);
        if !model.exists() || !dict.exists() {
            return Err(VisionDomError::BackendUnavailable(format!(
                "paddle recognizer files missing in {} (expected {REC_MODEL_FILE} and {REC_DICT_FILE})",
                dir.display()
            )));
        }

        let dict_text = std::fs::read_to_string(&dict).map_err(|e| {
            VisionDomError::BackendUnavailable(format!("paddle dict {}: {e}", dict.display()))
        })?;
        let decoder = CtcDecoder::from_dict_text(&dict_text, use_space_char);

        let session = Session::builder()
            .map_err(|e| VisionDomError::BackendUnavailable(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionDomError::BackendUnavailable(format!("ort opt-level: {e}")))?
            .commit_from_file(&model)
            .map_err(|e| {
                VisionDomError::BackendUnavailable(format!("ort load {}: {e}", model.display()))
            })?;

        tracing::info!(path = %model.display(), symbols = decoder.num_classes(), "paddle recognizer loaded");
        Ok(Self { session, decoder })
    }

    fn recognize_line(&mut self, line: &RgbImage) -> VisionDomResult<(String, f32)> {
        let tensor = preprocess_line(line);
        let input = Tensor::from_array(tensor)
            .map_err(|e| VisionDomError::Inference(format!("ort tensor: {e}")))?;

        let probs = {
            let outputs = self
                .session
                .run(ort::inputs![input])
                .map_err(|e| VisionDomError::Inference(format!("ort run: {e}")))?;
            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| VisionDomError::Inference(format!("extract tensor: {e}")))?
                .to_owned()
        };

        let probs = probs
            .into_dimensionality::<Ix3>()
            .map_err(|e| VisionDomError::Inference(format!("recognizer output: {e}")))?;
        if probs.shape()[0] == 0 {
            return Ok((String::new(), 0.0));
        }
        Ok(self.decoder.decode(probs.index_axis(ndarray::Axis(0), 0)))
    }
}

/// Height-48 resize keeping aspect ratio, `(x/255 - 0.5) / 0.5`, NCHW.
fn preprocess_line(line: &RgbImage) -> Array4<f32> {
    let (w, h) = line.dimensions();
    let ratio = w as f32 / h.max(1) as f32;
    let target_w = ((REC_HEIGHT as f32 * ratio).ceil() as u32).clamp(REC_HEIGHT / 4, REC_MAX_WIDTH);
    let resized = image::imageops::resize(
        line,
        target_w,
        REC_HEIGHT,
        image::imageops::FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, REC_HEIGHT as usize, target_w as usize));
    for (x, y, p) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (p[c] as f32 / 255.0 - 0.5) / 0.5;
        }
    }
    tensor
}

pub struct PaddleBackend {
    root: PathBuf,
    use_space_char: bool,
    drop_score: f32,
    recognizers: HashMap<String, Recognizer>,
}

impl PaddleBackend {
    /// Loads the recognizer for `language` eagerly so a broken install is
    /// reported at construction (and triggers the fallback backend).
    pub fn new(
        model_dir: &Path,
        language: &str,
        use_space_char: bool,
        drop_score: f32,
    ) -> VisionDomResult<Self> {
        let root = model_dir.join("paddle");
        if !root.is_dir() {
            return Err(VisionDomError::BackendUnavailable(format!(
                "paddle model directory {} does not exist",
                root.display()
            )));
        }
        let mut backend = Self {
            root,
            use_space_char,
            drop_score,
            recognizers: HashMap::new(),
        };
        backend.recognizer(language)?;
        Ok(backend)
    }

    fn recognizer(&mut self, language: &str) -> VisionDomResult<&mut Recognizer> {
        if !self.recognizers.contains_key(language) {
            let rec = Recognizer::load(&self.root.join(language), self.use_space_char)?;
            self.recognizers.insert(language.to_string(), rec);
        }
        self.recognizers
            .get_mut(language)
            .ok_or_else(|| VisionDomError::BackendUnavailable(format!("no recognizer for {language}")))
    }
}

impl TextBackend for PaddleBackend {
    fn name(&self) -> &'static str {
        "paddle"
    }

    fn extract(&mut self, region: &RgbImage, language: &str) -> VisionDomResult<Vec<String>> {
        let drop_score = self.drop_score;
        let rects = split_lines(region);
        let recognizer = self.recognizer(language)?;

        let mut lines = Vec::with_capacity(rects.len());
        for r in rects {
            let strip = image::imageops::crop_imm(region, r.x, r.y, r.width, r.height).to_image();
            let (text, score) = recognizer.recognize_line(&strip)?;
            let text = text.trim().to_string();
            if text.is_empty() || score < drop_score {
                tracing::trace!(%text, score, "recognized line dropped");
                continue;
            }
            lines.push(text);
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_dir_is_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = PaddleBackend::new(dir.path(), "ch", true, 0.5).err().unwrap();
        assert!(err.is_backend_unavailable());
    }

    #[test]
    fn missing_language_files_are_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("paddle").join("ch")).unwrap();
        std::fs::write(dir.path().join("paddle").join("ch").join(REC_DICT_FILE), "登\n录\n").unwrap();
        let err = PaddleBackend::new(dir.path(), "ch", true, 0.5).err().unwrap();
        assert!(err.is_backend_unavailable());
    }

    #[test]
    fn corrupt_model_is_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let lang = dir.path().join("paddle").join("en");
        std::fs::create_dir_all(&lang).unwrap();
        std::fs::write(lang.join(REC_DICT_FILE), "a\nb\n").unwrap();
        std::fs::write(lang.join(REC_MODEL_FILE), b"definitely not onnx").unwrap();
        let err = PaddleBackend::new(dir.path(), "en", true, 0.5).err().unwrap();
        assert!(err.is_backend_unavailable());
    }

    #[test]
    fn undecodable_dict_is_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let lang = dir.path().join("paddle").join("en");
        std::fs::create_dir_all(&lang).unwrap();
        std::fs::write(lang.join(REC_DICT_FILE), [0xff, 0xfe]).unwrap();
        std::fs::write(lang.join(REC_MODEL_FILE), b"unused").unwrap();
        let err = PaddleBackend::new(dir.path(), "en", true, 0.5).err().unwrap();
        assert!(err.is_backend_unavailable(), "{err}");
    }

    #[test]
    fn line_tensor_is_height_48_and_normalized() {
        let line = RgbImage::from_pixel(100, 25, image::Rgb([255, 0, 127]));
        let t = preprocess_line(&line);
        assert_eq!(t.shape(), &[1, 3, 48, 192]);
        assert!((t[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert!((t[[0, 1, 10, 10]] + 1.0).abs() < 1e-6);
    }
}
