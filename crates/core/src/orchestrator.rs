use crate::chunking::ChunkingConfig;
use crate::config::{EmbeddingBackend, QaConfig, StoreBackend};
use crate::embeddings::{Embedder, NgramHashEmbedder};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::prepare_document;
use crate::llm::OpenAiChatModel;
use crate::models::{Answer, IngestReport, QaOptions};
use crate::prompt::render_prompt;
use crate::stores::{LocalVectorStore, QdrantStore};
use crate::traits::{LanguageModel, VectorIndex};
use crate::QaError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct BatchIngestReport {
    pub ingested: Vec<IngestReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Answers questions about ingested invoices.
///
/// Owns one extractor, one embedder, one vector store and one language
/// model for its whole life. Build it once and share it (behind an `Arc`)
/// between requests; `ingest` and `ask` only change what is in the store.
pub struct InvoiceAssistant {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Box<dyn VectorIndex>,
    model: Box<dyn LanguageModel>,
    options: QaOptions,
}

impl InvoiceAssistant {
    pub fn new(
        embedder: impl Embedder + 'static,
        store: impl VectorIndex + 'static,
        model: impl LanguageModel + 'static,
        options: QaOptions,
    ) -> Result<Self, QaError> {
        ChunkingConfig::from(options).validate()?;

        Ok(Self {
            extractor: Arc::new(LopdfExtractor),
            embedder: Arc::new(embedder),
            store: Box::new(store),
            model: Box::new(model),
            options,
        })
    }

    pub fn with_extractor(mut self, extractor: impl PdfExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Builds the configured collaborators.
    ///
    /// The API key is checked before the embedding model is loaded or the
    /// store is opened, so a missing credential leaves no trace on disk.
    pub async fn from_config(config: &QaConfig) -> Result<Self, QaError> {
        let model = OpenAiChatModel::new(
            config.openai_api_key.as_deref(),
            &config.openai_base_url,
            config.chat_model.clone(),
        )?
        .with_temperature(config.temperature);
        ChunkingConfig::from(config.options).validate()?;

        let embedder = load_embedder(&config.embedding).await?;

        let store: Box<dyn VectorIndex> = match &config.store {
            StoreBackend::Local => Box::new(LocalVectorStore::open(&config.persist_dir).await?),
            StoreBackend::Qdrant { url, collection } => {
                let store = QdrantStore::new(url.clone(), collection.clone(), embedder.dimensions());
                store.ensure_collection().await?;
                Box::new(store)
            }
        };

        info!(
            chat_model = %model.model(),
            store = ?config.store,
            embedding = ?config.embedding,
            "invoice assistant ready"
        );

        Ok(Self {
            extractor: Arc::new(LopdfExtractor),
            embedder,
            store,
            model: Box::new(model),
            options: config.options,
        })
    }

    pub fn options(&self) -> QaOptions {
        self.options
    }

    pub async fn stored_chunks(&self) -> Result<usize, QaError> {
        self.store.len().await
    }

    /// Extracts, chunks and embeds the PDF at `path`, then appends every
    /// chunk to the store in one batch.
    ///
    /// Any failure before the final append leaves the store untouched.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport, QaError> {
        let extractor = Arc::clone(&self.extractor);
        let embedder = Arc::clone(&self.embedder);
        let owned_path = path.to_path_buf();
        let config = ChunkingConfig::from(self.options);

        let prepared = tokio::task::spawn_blocking(move || {
            prepare_document(&owned_path, extractor.as_ref(), embedder.as_ref(), config)
        })
        .await
        .map_err(|error| QaError::Task(error.to_string()))??;

        self.store
            .add_chunks(&prepared.chunks, &prepared.embeddings, &prepared.provenance())
            .await?;

        info!(
            path = %path.display(),
            chunks = prepared.chunks.len(),
            checksum = %prepared.source.document_checksum,
            "ingested document"
        );

        Ok(IngestReport {
            source_name: prepared.source.source_name,
            document_checksum: prepared.source.document_checksum,
            chunk_count: prepared.chunks.len(),
        })
    }

    /// Ingests each file on its own; a failing file is reported and skipped.
    pub async fn ingest_many(&self, paths: &[PathBuf]) -> BatchIngestReport {
        let mut ingested = Vec::new();
        let mut skipped_files = Vec::new();

        for path in paths {
            match self.ingest(path).await {
                Ok(report) => ingested.push(report),
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipped pdf");
                    skipped_files.push(SkippedPdf {
                        path: path.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        BatchIngestReport {
            ingested,
            skipped_files,
        }
    }

    pub async fn ask(&self, query: &str) -> Result<Answer, QaError> {
        let embedder = Arc::clone(&self.embedder);
        let owned_query = query.to_string();
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed(&owned_query))
            .await
            .map_err(|error| QaError::Task(error.to_string()))??;

        let sources = self.store.search(&query_vector, self.options.top_k).await?;
        debug!(
            retrieved = sources.len(),
            top_score = sources.first().map(|hit| hit.score),
            "retrieved context"
        );

        let prompt = render_prompt(&sources, query);
        let answer = self.model.generate(&prompt).await?;

        info!(sources = sources.len(), "answered query");
        Ok(Answer {
            query: query.to_string(),
            answer,
            sources,
        })
    }
}

async fn load_embedder(backend: &EmbeddingBackend) -> Result<Arc<dyn Embedder>, QaError> {
    match backend {
        EmbeddingBackend::NgramHash => Ok(Arc::new(NgramHashEmbedder::default())),
        #[cfg(feature = "sentence-model")]
        EmbeddingBackend::SentenceModel { model_dir } => {
            let model_dir = model_dir.clone();
            let embedder = tokio::task::spawn_blocking(move || {
                crate::embeddings::MiniLmEmbedder::load(&model_dir)
            })
            .await
            .map_err(|error| QaError::Task(error.to_string()))??;
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "sentence-model"))]
        EmbeddingBackend::SentenceModel { model_dir } => Err(QaError::InvalidConfig(format!(
            "embedding model at {} requires the `sentence-model` feature",
            model_dir.display()
        ))),
    }
}
