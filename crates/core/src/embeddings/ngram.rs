use super::{l2_normalize, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::error::QaError;

const WORD_WEIGHT: f32 = 2.0;
const TRIGRAM_WEIGHT: f32 = 1.0;

/// Hashes lowercased words and their character trigrams into a fixed number
/// of buckets, then L2-normalises.
///
/// Needs no model files, so it backs tests and offline setups where the
/// sentence model is not installed. Lexical overlap drives similarity.
#[derive(Debug, Clone, Copy)]
pub struct NgramHashEmbedder {
    pub dimensions: usize,
}

impl Default for NgramHashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for NgramHashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, QaError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];

        for word in words(text) {
            add_feature(&mut vector, &word, WORD_WEIGHT);

            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for window in padded.windows(3) {
                let trigram = window.iter().collect::<String>();
                add_feature(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

fn add_feature(vector: &mut [f32], feature: &str, weight: f32) {
    let bucket = (fnv1a(feature) % vector.len() as u64) as usize;
    vector[bucket] += weight;
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(left: &[f32], right: &[f32]) -> f32 {
        left.iter().zip(right).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn embedder_is_deterministic() -> Result<(), QaError> {
        let embedder = NgramHashEmbedder::default();
        let first = embedder.embed("Invoice #1001, Total: $500.00")?;
        let second = embedder.embed("Invoice #1001, Total: $500.00")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn embedder_outputs_expected_length() -> Result<(), QaError> {
        let embedder = NgramHashEmbedder { dimensions: 32 };
        assert_eq!(embedder.embed("abc")?.len(), 32);
        assert_eq!(embedder.dimensions(), 32);
        Ok(())
    }

    #[test]
    fn vectors_are_unit_length_unless_empty() -> Result<(), QaError> {
        let embedder = NgramHashEmbedder::default();
        let vector = embedder.embed("Due date: 2024-03-01")?;
        let norm = cosine(&vector, &vector).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        let empty = embedder.embed("  ... ")?;
        assert!(empty.iter().all(|value| *value == 0.0));
        Ok(())
    }

    #[test]
    fn shared_words_score_higher() -> Result<(), QaError> {
        let embedder = NgramHashEmbedder::default();
        let query = embedder.embed("What is the total amount?")?;
        let total = embedder.embed("Invoice #1001, Total: $500.00")?;
        let address = embedder.embed("Ship to: 42 Elm Street, Springfield")?;
        assert!(cosine(&query, &total) > cosine(&query, &address));
        Ok(())
    }

    #[test]
    fn batch_matches_single_embeddings() -> Result<(), QaError> {
        let embedder = NgramHashEmbedder::default();
        let texts = vec!["first line".to_string(), "second line".to_string()];
        let batch = embedder.embed_batch(&texts)?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed("second line")?);
        Ok(())
    }
}
