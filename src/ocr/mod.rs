//! Per-region text extraction with a primary and a fallback backend.
//!
//! Line order within one region is whatever the selected backend reports
//! as its reading order. It is not normalized across backends, so two
//! installs falling back differently may order multi-line text differently.

pub mod ctc;
pub mod lines;
pub mod ocrs_engine;
pub mod paddle;

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use image::RgbImage;

use crate::config::OcrConfig;
use crate::errors::{VisionDomError, VisionDomResult};

/// A text-recognition engine bound to one worker at a time.
pub trait TextBackend: Send {
    fn name(&self) -> &'static str;
    fn extract(&mut self, region: &RgbImage, language: &str) -> VisionDomResult<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Paddle,
    Ocrs,
}

impl FromStr for BackendKind {
    type Err = VisionDomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paddle" | "paddleocr" => Ok(BackendKind::Paddle),
            "ocrs" => Ok(BackendKind::Ocrs),
            other => Err(VisionDomError::InvalidConfiguration(format!(
                "unsupported text backend {other:?} (expected \"paddle\" or \"ocrs\")"
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BackendKind::Paddle => "paddle",
            BackendKind::Ocrs => "ocrs",
        })
    }
}

/// Builds backends. Construction failures that merely mean "not installed"
/// must be reported as `BackendUnavailable`.
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: BackendKind, language: &str) -> VisionDomResult<Box<dyn TextBackend>>;
}

pub struct DefaultBackendFactory {
    config: OcrConfig,
}

impl DefaultBackendFactory {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, kind: BackendKind, language: &str) -> VisionDomResult<Box<dyn TextBackend>> {
        match kind {
            BackendKind::Paddle => Ok(Box::new(paddle::PaddleBackend::new(
                &self.config.model_dir,
                language,
                self.config.use_space_char,
                self.config.drop_score,
            )?)),
            BackendKind::Ocrs => Ok(Box::new(ocrs_engine::OcrsBackend::new(
                &self.config.ocrs_model_dir,
            )?)),
        }
    }
}

/// One selected backend, fixed for the life of the instance.
pub struct TextEnricher {
    kind: BackendKind,
    backend: Box<dyn TextBackend>,
}

impl std::fmt::Debug for TextEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEnricher")
            .field("kind", &self.kind)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl TextEnricher {
    /// Try `primary`; only `BackendUnavailable` moves on to `fallback`.
    pub fn new(
        factory: &dyn BackendFactory,
        primary: BackendKind,
        fallback: BackendKind,
        language: &str,
    ) -> VisionDomResult<Self> {
        match factory.create(primary, language) {
            Ok(backend) => Ok(Self::with_backend(primary, backend)),
            Err(e) if e.is_backend_unavailable() => {
                tracing::warn!(%primary, %fallback, error = %e, "primary text backend unavailable; falling back");
                match factory.create(fallback, language) {
                    Ok(backend) => Ok(Self::with_backend(fallback, backend)),
                    Err(e2) if e2.is_backend_unavailable() => Err(VisionDomError::ModelLoad(format!(
                        "no text backend available: {primary}: {e}; {fallback}: {e2}"
                    ))),
                    Err(e2) => Err(e2),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Pin an already built backend; no fallback selection happens.
    pub fn with_backend(kind: BackendKind, backend: Box<dyn TextBackend>) -> Self {
        Self { kind, backend }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Zero-area regions short-circuit to an empty result.
    pub fn extract(&mut self, region: &RgbImage, language: &str) -> VisionDomResult<Vec<String>> {
        if region.width() == 0 || region.height() == 0 {
            return Ok(Vec::new());
        }
        self.backend.extract(region, language)
    }
}

/// Idle enrichers kept between inspections so models load once per process.
pub struct EnricherPool {
    factory: Arc<dyn BackendFactory>,
    primary: BackendKind,
    fallback: BackendKind,
    language: String,
    /// Backend chosen by the first successful construction.
    selected: Mutex<Option<BackendKind>>,
    idle: Mutex<Vec<TextEnricher>>,
}

impl EnricherPool {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        primary: BackendKind,
        fallback: BackendKind,
        language: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            primary,
            fallback,
            language: language.into(),
            selected: Mutex::new(None),
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &OcrConfig) -> VisionDomResult<Self> {
        Ok(Self::new(
            Arc::new(DefaultBackendFactory::new(config.clone())),
            config.primary_backend.parse()?,
            config.fallback_backend.parse()?,
            config.language.clone(),
        ))
    }

    /// Build one enricher now so load failures surface to the caller.
    pub fn warm_up(&self) -> VisionDomResult<BackendKind> {
        let enricher = self.checkout()?;
        let kind = enricher.backend_kind();
        self.checkin(enricher);
        Ok(kind)
    }

    pub fn selected_backend(&self) -> Option<BackendKind> {
        *self.selected.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn checkout(&self) -> VisionDomResult<TextEnricher> {
        if let Some(e) = self.idle.lock().unwrap_or_else(|p| p.into_inner()).pop() {
            return Ok(e);
        }

        // Once a backend has been selected, later instances use it directly.
        if let Some(kind) = self.selected_backend() {
            let backend = self.factory.create(kind, &self.language)?;
            return Ok(TextEnricher::with_backend(kind, backend));
        }

        let enricher =
            TextEnricher::new(self.factory.as_ref(), self.primary, self.fallback, &self.language)?;
        let mut selected = self.selected.lock().unwrap_or_else(|p| p.into_inner());
        if selected.is_none() {
            *selected = Some(enricher.backend_kind());
        }
        Ok(enricher)
    }

    pub fn checkin(&self, enricher: TextEnricher) {
        self.idle
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(enricher);
    }
}
