use std::path::Path;

use image::RgbImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;

use crate::errors::{VisionDomError, VisionDomResult};
use crate::ocr::TextBackend;

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Text extraction with the `ocrs` engine. Latin script only.
pub struct OcrsBackend {
    engine: OcrEngine,
}

impl OcrsBackend {
    /// Load both models from `model_dir` (usually `~/.cache/ocrs`, where
    /// `ocrs-cli` downloads them).
    pub fn new(model_dir: &Path) -> VisionDomResult<Self> {
        let detection_model_path = model_dir.join(DETECTION_MODEL);
        let recognition_model_path = model_dir.join(RECOGNITION_MODEL);

        if !detection_model_path.exists() || !recognition_model_path.exists() {
            return Err(VisionDomError::BackendUnavailable(format!(
                "ocrs models not found. Expected:\n  - {}\n  - {}",
                detection_model_path.display(),
                recognition_model_path.display()
            )));
        }

        let detection_model = Model::load_file(&detection_model_path)
            .map_err(|e| VisionDomError::BackendUnavailable(format!("ocrs detection model: {e}")))?;
        let recognition_model = Model::load_file(&recognition_model_path)
            .map_err(|e| VisionDomError::BackendUnavailable(format!("ocrs recognition model: {e}")))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| VisionDomError::BackendUnavailable(format!("ocrs engine: {e}")))?;

        tracing::info!(dir = %model_dir.display(), "ocrs engine loaded");
        Ok(Self { engine })
    }
}

impl TextBackend for OcrsBackend {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn extract(&mut self, region: &RgbImage, language: &str) -> VisionDomResult<Vec<String>> {
        if !matches!(language, "en" | "latin" | "fr" | "de" | "es" | "it" | "pt") {
            tracing::debug!(language, "ocrs only reads Latin script; extracting anyway");
        }

        let source = ImageSource::from_bytes(region.as_raw(), region.dimensions())
            .map_err(|e| VisionDomError::Inference(format!("ocrs image source: {e}")))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| VisionDomError::Inference(format!("ocrs prepare: {e}")))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|e| VisionDomError::Inference(format!("ocrs detect: {e}")))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let line_texts = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| VisionDomError::Inference(format!("ocrs recognize: {e}")))?;

        Ok(line_texts
            .iter()
            .flatten()
            .map(|line| line.to_string().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect())
    }
}
