use crate::llm::{DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL};
use crate::models::QaOptions;
use std::path::PathBuf;

pub const DEFAULT_PERSIST_DIR: &str = "./vector_db";
pub const DEFAULT_MODEL_DIR: &str = "./models/all-MiniLM-L6-v2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite collection inside `persist_dir`.
    Local,
    Qdrant { url: String, collection: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Hashed word and trigram features. Needs no model files.
    NgramHash,
    /// Directory holding `config.json`, `tokenizer.json` and `model.safetensors`.
    SentenceModel { model_dir: PathBuf },
}

/// Everything needed to build an [`crate::InvoiceAssistant`].
#[derive(Clone)]
pub struct QaConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub persist_dir: PathBuf,
    pub store: StoreBackend,
    pub embedding: EmbeddingBackend,
    pub options: QaOptions,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            store: StoreBackend::Local,
            embedding: EmbeddingBackend::SentenceModel {
                model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            },
            options: QaOptions::default(),
        }
    }
}

impl std::fmt::Debug for QaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaConfig")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("persist_dir", &self.persist_dir)
            .field("store", &self.store)
            .field("embedding", &self.embedding)
            .field("options", &self.options)
            .finish()
    }
}
