pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use config::{EmbeddingBackend, QaConfig, StoreBackend, DEFAULT_MODEL_DIR, DEFAULT_PERSIST_DIR};
#[cfg(feature = "sentence-model")]
pub use embeddings::MiniLmEmbedder;
pub use embeddings::{Embedder, NgramHashEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::QaError;
pub use extractor::{extract_text, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{digest_file, discover_pdf_files, prepare_document, PreparedDocument};
pub use llm::{OpenAiChatModel, API_KEY_VAR, DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL};
pub use metrics::{precision_at_k, recall_at_k};
pub use models::{
    Answer, ChunkProvenance, DocumentChunk, DocumentSource, IngestReport, QaOptions,
    RetrievedChunk,
};
pub use orchestrator::{BatchIngestReport, InvoiceAssistant, SkippedPdf};
pub use prompt::{render_prompt, PROMPT_TEMPLATE, REFUSAL_PHRASE};
pub use stores::{LocalVectorStore, QdrantStore};
pub use traits::{LanguageModel, VectorIndex};
