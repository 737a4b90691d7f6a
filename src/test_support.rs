//! Offline stand-ins for the embedding model and completion endpoint.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use crate::api::Completer;
use crate::error::{EmbeddingError, GenerationError};
use crate::store::SupportStore;
use crate::vector_store::{Embedder, Metric};

pub const TEST_DIMENSION: usize = 16;

pub fn memory_store() -> SupportStore {
    SupportStore::open(":memory:", TEST_DIMENSION, Metric::Euclidean).expect("in-memory store")
}

/// Bag-of-words feature hashing, L2 normalised. Identical text, identical vector.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::with_dimension(TEST_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0f32; self.dimension];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}

/// An embedder whose model never loaded.
pub struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn encode(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Tokenizer("model not loaded".to_string()))
    }
}

/// Records every prompt and answers with a fixed reply or a fixed failure.
pub struct ScriptedCompleter {
    reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompleter {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log").clone()
    }
}

impl Completer for ScriptedCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().expect("prompt log").push(prompt.to_string());
        self.reply.clone().map_err(GenerationError::Provider)
    }
}
