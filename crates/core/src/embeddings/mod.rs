use crate::error::QaError;

#[cfg(feature = "sentence-model")]
pub mod minilm;
pub mod ngram;

#[cfg(feature = "sentence-model")]
pub use minilm::MiniLmEmbedder;
pub use ngram::NgramHashEmbedder;

/// Output size of `all-MiniLM-L6-v2`; the hashed embedder matches it by default.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for a given model so that a chunk
/// and a later query mentioning the same content land close together.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, QaError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}
