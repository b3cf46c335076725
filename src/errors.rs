use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionDomError {
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Text backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Enrichment task failed: {0}")]
    EnrichmentTask(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl VisionDomError {
    /// Only this kind triggers the secondary text backend.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, VisionDomError::BackendUnavailable(_))
    }
}

impl serde::Serialize for VisionDomError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type VisionDomResult<T> = Result<T, VisionDomError>;
