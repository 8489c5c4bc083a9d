//! Local `sentence-transformers/all-MiniLM-L6-v2` embeddings on candle.
//!
//! The model directory must hold `config.json`, `tokenizer.json` and
//! `model.safetensors` as published on the Hugging Face hub.

use super::{Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::error::QaError;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::info;

const MAX_SEQUENCE_TOKENS: usize = 256;

pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl MiniLmEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self, QaError> {
        let device = Device::Cpu;

        let config_path = model_dir.join("config.json");
        if !config_path.exists() {
            return Err(QaError::FileNotFound(config_path));
        }
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|error| {
            QaError::Embedding(format!(
                "failed to load tokenizer from {}: {error}",
                tokenizer_path.display()
            ))
        })?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|error| QaError::Embedding(error.to_string()))?;

        let weights_path = model_dir.join("model.safetensors");
        // SAFETY: the weights file is opened read-only and is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device) }
            .map_err(candle_error)?;
        let model = BertModel::load(vb, &config).map_err(candle_error)?;

        info!(model_dir = %model_dir.display(), "sentence embedding model loaded");
        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn forward(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|error| QaError::Embedding(format!("tokenization failed: {error}")))?;

        let ids = encodings
            .iter()
            .map(|encoding| Tensor::new(encoding.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(candle_error)?;
        let masks = encodings
            .iter()
            .map(|encoding| Tensor::new(encoding.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(candle_error)?;

        let input_ids = Tensor::stack(&ids, 0).map_err(candle_error)?;
        let attention_mask = Tensor::stack(&masks, 0).map_err(candle_error)?;
        let token_type_ids = input_ids.zeros_like().map_err(candle_error)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(candle_error)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask).map_err(candle_error)?;
        pooled.to_vec2::<f32>().map_err(candle_error)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dimensions(&self) -> usize {
        DEFAULT_EMBEDDING_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, QaError> {
        self.forward(&[text.to_string()])?
            .pop()
            .ok_or_else(|| QaError::Embedding("model returned no vector".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.forward(texts)
    }
}

/// Mean of the token states under the attention mask, scaled to unit length.
fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    let mean = summed.broadcast_div(&counts)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
    mean.broadcast_div(&norm)?.to_dtype(DType::F32)
}

fn candle_error(error: candle_core::Error) -> QaError {
    QaError::Embedding(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pooling_ignores_masked_tokens_and_normalises() -> candle_core::Result<()> {
        let hidden = Tensor::new(
            &[
                [[1f32, 0.], [3., 0.], [100., 100.]],
                [[0., 2.], [0., 4.], [0., 6.]],
            ],
            &Device::Cpu,
        )?;
        let mask = Tensor::new(&[[1u32, 1, 0], [1, 1, 1]], &Device::Cpu)?;

        let pooled = masked_mean_l2(&hidden, &mask)?.to_vec2::<f32>()?;
        let expected = [[1f32, 0.], [0., 1.]];
        for (row, want) in pooled.iter().zip(expected) {
            for (got, want) in row.iter().zip(want) {
                assert!((got - want).abs() < 1e-5, "{pooled:?}");
            }
        }
        Ok(())
    }

    #[test]
    fn missing_model_dir_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = MiniLmEmbedder::load(&dir.path().join("absent"));
        assert!(matches!(result, Err(QaError::FileNotFound(path)) if path.ends_with("config.json")));
        Ok(())
    }
}
