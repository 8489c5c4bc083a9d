use crate::models::{ChunkProvenance, DocumentChunk, RetrievedChunk};
use crate::QaError;
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Appends one entry per chunk. Either the whole batch is persisted or
    /// nothing is.
    async fn add_chunks(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
        provenance: &[ChunkProvenance],
    ) -> Result<(), QaError>;

    /// Up to `top_k` entries, nearest first. An empty store yields an empty list.
    async fn search(&self, query_vector: &[f32], top_k: usize)
        -> Result<Vec<RetrievedChunk>, QaError>;

    async fn len(&self) -> Result<usize, QaError>;

    async fn is_empty(&self) -> Result<bool, QaError> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, QaError>;
}

pub(crate) fn check_batch_shape(
    chunks: &[DocumentChunk],
    embeddings: &[Vec<f32>],
    provenance: &[ChunkProvenance],
) -> Result<(), QaError> {
    if chunks.len() != embeddings.len() || chunks.len() != provenance.len() {
        return Err(QaError::Store(format!(
            "batch mismatch: {} chunks, {} embeddings, {} provenance records",
            chunks.len(),
            embeddings.len(),
            provenance.len()
        )));
    }
    Ok(())
}
