use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{VisionDomError, VisionDomResult};
use crate::ocr::BackendKind;

const CONFIG_ENV: &str = "VISION_DOM_CONFIG";
const WORKERS_ENV: &str = "VISION_DOM_WORKERS";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Path to the ONNX export of the UI detector weights.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    /// Label per class index. Missing entries fall back to the numeric id.
    #[serde(default)]
    pub class_names: Vec<String>,
    #[serde(default = "default_conf_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            class_names: Vec::new(),
            confidence_threshold: default_conf_threshold(),
            iou_threshold: default_iou_threshold(),
            input_size: default_input_size(),
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/ui_detector.onnx")
}

fn default_conf_threshold() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_input_size() -> u32 {
    640
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// "paddle" or "ocrs".
    #[serde(default = "default_primary_backend")]
    pub primary_backend: String,
    #[serde(default = "default_fallback_backend")]
    pub fallback_backend: String,
    /// Root holding `paddle/<language>/{rec.onnx,dict.txt}`.
    #[serde(default = "default_ocr_model_dir")]
    pub model_dir: PathBuf,
    /// Directory holding `text-detection.rten` and `text-recognition.rten`.
    #[serde(default = "default_ocrs_model_dir")]
    pub ocrs_model_dir: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
    /// Recognized lines scoring below this are dropped.
    #[serde(default = "default_drop_score")]
    pub drop_score: f32,
    #[serde(default = "default_true")]
    pub use_space_char: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            primary_backend: default_primary_backend(),
            fallback_backend: default_fallback_backend(),
            model_dir: default_ocr_model_dir(),
            ocrs_model_dir: default_ocrs_model_dir(),
            language: default_language(),
            drop_score: default_drop_score(),
            use_space_char: true,
        }
    }
}

fn default_primary_backend() -> String {
    "paddle".into()
}

fn default_fallback_backend() -> String {
    "ocrs".into()
}

fn default_ocr_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vision-dom")
        .join("ocr")
}

fn default_ocrs_model_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("ocrs")
}

fn default_language() -> String {
    "ch".into()
}

fn default_drop_score() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Enrichment worker count; 0 picks half the available cores.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_true")]
    pub enable_text_enrichment: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            enable_text_enrichment: true,
        }
    }
}

impl PipelineConfig {
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            default_worker_count()
        }
    }
}

/// `max(1, floor(cores / 2))`.
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 2).max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    #[serde(default = "default_settle_ms")]
    pub settle_interval_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            settle_interval_ms: default_settle_ms(),
        }
    }
}

fn default_settle_ms() -> u64 {
    500
}

impl InteractionConfig {
    /// Pause after pointer moves and wheel events.
    pub fn settle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_interval_ms)
    }
}

impl AppConfig {
    pub fn primary_backend(&self) -> VisionDomResult<BackendKind> {
        self.ocr.primary_backend.parse()
    }

    pub fn fallback_backend(&self) -> VisionDomResult<BackendKind> {
        self.ocr.fallback_backend.parse()
    }

    /// Reject values the pipeline cannot run with instead of silently clamping them.
    pub fn validate(&self) -> VisionDomResult<()> {
        self.primary_backend()?;
        self.fallback_backend()?;

        for (field, value) in [
            ("detector.confidence_threshold", self.detector.confidence_threshold),
            ("detector.iou_threshold", self.detector.iou_threshold),
            ("ocr.drop_score", self.ocr.drop_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(VisionDomError::InvalidConfiguration(format!(
                    "{field} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(VisionDomError::InvalidConfiguration(format!(
                "detector.input_size must be a positive multiple of 32, got {}",
                self.detector.input_size
            )));
        }
        if self.ocr.language.trim().is_empty() {
            return Err(VisionDomError::InvalidConfiguration(
                "ocr.language must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> VisionDomResult<()> {
        if let Ok(raw) = std::env::var(WORKERS_ENV) {
            let workers = raw.trim().parse::<usize>().map_err(|_| {
                VisionDomError::InvalidConfiguration(format!(
                    "{WORKERS_ENV} must be a non-negative integer, got {raw:?}"
                ))
            })?;
            tracing::debug!(workers, "worker count overridden from environment");
            self.pipeline.workers = workers;
        }
        Ok(())
    }
}

fn resolve_config_path() -> VisionDomResult<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found via {CONFIG_ENV}");
            return Ok(candidate);
        }
        return Err(VisionDomError::Config(format!(
            "{CONFIG_ENV} points to {} which does not exist",
            candidate.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(VisionDomError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> VisionDomResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> VisionDomResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;
    config.apply_env_overrides()?;
    config.validate()?;
    tracing::info!(
        path = %path.display(),
        model = %config.detector.model_path.display(),
        primary = %config.ocr.primary_backend,
        "config loaded"
    );
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> VisionDomResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.ocr.primary_backend, "paddle");
        assert_eq!(config.ocr.fallback_backend, "ocrs");
        assert_eq!(config.ocr.language, "ch");
        assert!(config.pipeline.enable_text_enrichment);
        assert_eq!(config.interaction.settle_interval_ms, 500);
        config.validate().unwrap();
    }

    #[test]
    fn parses_sections() {
        let raw = r#"
            [detector]
            model_path = "weights/bilibili.onnx"
            class_names = ["channel-link", "button"]
            confidence_threshold = 0.4

            [ocr]
            primary_backend = "ocrs"
            fallback_backend = "paddle"
            language = "en"

            [pipeline]
            workers = 3
            enable_text_enrichment = false
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.detector.model_path, PathBuf::from("weights/bilibili.onnx"));
        assert_eq!(config.detector.class_names, vec!["channel-link", "button"]);
        assert_eq!(config.primary_backend().unwrap(), BackendKind::Ocrs);
        assert_eq!(config.fallback_backend().unwrap(), BackendKind::Paddle);
        assert_eq!(config.pipeline.resolved_workers(), 3);
        assert!(!config.pipeline.enable_text_enrichment);
    }

    #[test]
    fn unknown_backend_is_invalid_configuration() {
        let mut config = AppConfig::default();
        config.ocr.primary_backend = "tesseract".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, VisionDomError::InvalidConfiguration(_)));
    }

    #[test]
    fn thresholds_out_of_range_are_rejected() {
        let mut config = AppConfig::default();
        config.detector.iou_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(VisionDomError::InvalidConfiguration(_))
        ));

        let mut config = AppConfig::default();
        config.detector.input_size = 650;
        assert!(matches!(
            config.validate(),
            Err(VisionDomError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn default_worker_count_is_at_least_one() {
        assert!(default_worker_count() >= 1);
        assert!(PipelineConfig::default().resolved_workers() >= 1);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.detector.class_names = vec!["button".into()];
        config.interaction.settle_interval_ms = 250;
        save_config(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.detector.class_names, vec!["button"]);
        assert_eq!(loaded.interaction.settle_interval_ms, 250);
    }
}
