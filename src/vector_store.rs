//! # Embeddings and distance
//!
//! The embedding side of the support store.
//!
//! - [`Embedder`] is the seam the rest of the crate talks to: text in, a
//!   fixed-length `Vec<f32>` out. It must be deterministic for identical input.
//! - [`SentenceEmbeddingsModel`] is the production implementation: a MiniLM
//!   sentence-transformer run with Candle (pure Rust), weights pulled from the
//!   Hugging Face Hub, mean pooled and L2 normalised.
//! - [`Metric`] is the distance used to rank neighbours. The same metric must be
//!   used for every query against a given database.
//!
//! ## Quick Example
//! ```no_run
//! use awful_support::vector_store::{Embedder, Metric, SentenceEmbeddingsModel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SentenceEmbeddingsModel::load("sentence-transformers/all-MiniLM-L12-v2")?;
//! let a = model.encode("I want a refund")?;
//! let b = model.encode("How do I get my money back?")?;
//! println!("distance = {}", Metric::Euclidean.distance(&a, &b));
//! # Ok(()) }
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use serde::{Deserialize, Serialize};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::EmbeddingError;

/// Output width of the MiniLM family of sentence models.
pub const DEFAULT_DIMENSION: usize = 384;

/// Model used when the configuration does not name one.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L12-v2";

/// Longest token sequence fed to the BERT encoder; longer input is truncated.
const MAX_SEQUENCE_LENGTH: usize = 512;

/// Text → fixed-length vector.
pub trait Embedder {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, preserving order.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Distance used for nearest-neighbour ranking. Smaller is closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    Cosine,
}

impl Metric {
    /// Distance between two equal-length vectors.
    ///
    /// Cosine distance is `1 - cos(a, b)`; a zero vector is treated as maximally
    /// dissimilar (`1.0`) rather than producing `NaN`.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Euclidean => euclidean_distance(a, b),
            Metric::Cosine => cosine_distance(a, b),
        }
    }
}

/// `sqrt(Σ (a[i] - b[i])^2)` over the shared prefix of `a` and `b`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// `1 - (a · b) / (|a| |b|)`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl SentenceEmbeddingsModel {
    /// Load `model_id` from the Hugging Face Hub (cached after the first run).
    pub fn load(model_id: &str) -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;
        info!("Loading embedding model {}", model_id);

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new()?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json")?;
        let tokenizer_filename = api_repo.get("tokenizer.json")?;
        let weights_filename = api_repo.get("model.safetensors")?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)?;
        let dimension = config.hidden_size;

        let mut tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // SAFETY: the safetensors file is owned by the hub cache and not mutated while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        debug!("Embedding model ready, dimension {}", dimension);

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> Result<Tensor, EmbeddingError> {
        // [1, seq_len, 1] so the mask broadcasts over the hidden dimension
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }

    /// L2 normalize the embedding vector
    fn normalize(&self, tensor: &Tensor) -> Result<Tensor, EmbeddingError> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        Ok(tensor.broadcast_div(&norm)?)
    }
}

impl Embedder for SentenceEmbeddingsModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;
        let pooled = self.mean_pooling(&output, tokens.get_attention_mask())?;
        let embedding = self.normalize(&pooled)?.to_vec1::<f32>()?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_distance_of_unit_axes() {
        let d = euclidean_distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d - 2f32.sqrt()).abs() < 1e-6);
        assert_eq!(euclidean_distance(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
    }

    #[test]
    fn cosine_distance_ignores_magnitude() {
        let d = cosine_distance(&[1.0, 2.0], &[2.0, 4.0]);
        assert!(d.abs() < 1e-6);
        let opposite = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((opposite - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_of_zero_vector_is_one() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn encode_batch_keeps_input_order() {
        let embedder = crate::test_support::HashEmbedder::default();
        let texts = ["refund", "my subscription", "", "refund"];

        let batch = embedder.encode_batch(&texts).unwrap();

        assert_eq!(batch.len(), texts.len());
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(vector, &embedder.encode(text).unwrap());
        }
        assert_eq!(batch[0], batch[3]);
        assert!(embedder.encode_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn metric_parses_from_lowercase_yaml() {
        let metric: Metric = serde_yaml::from_str("cosine").unwrap();
        assert_eq!(metric, Metric::Cosine);
        assert_eq!(Metric::default(), Metric::Euclidean);
    }

    #[test]
    #[ignore = "downloads model weights from the Hugging Face Hub"]
    fn sentence_model_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let model = SentenceEmbeddingsModel::load(DEFAULT_MODEL)?;
        let a = model.encode("I want a refund for my subscription")?;
        let b = model.encode("I want a refund for my subscription")?;
        assert_eq!(a.len(), DEFAULT_DIMENSION);
        assert_eq!(a, b);
        Ok(())
    }
}
