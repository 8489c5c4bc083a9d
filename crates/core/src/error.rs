use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("empty document: {0}")]
    EmptyDocument(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("upstream {service} failed: {details}")]
    Upstream { service: String, details: String },

    #[error("vector store error: {0}")]
    Store(String),

    #[error("vector store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QaError {
    pub(crate) fn upstream(service: &str, details: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.to_string(),
            details: details.into(),
        }
    }
}

impl From<url::ParseError> for QaError {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidConfig(format!("url parse error: {value}"))
    }
}

pub type Result<T, E = QaError> = std::result::Result<T, E>;
