//! # Error taxonomy
//!
//! Typed errors for each layer of the retrieval pipeline:
//!
//! - [`EmbeddingError`]: the sentence model could not produce a vector.
//! - [`StoreError`]: the SQLite store could not be opened, queried or written.
//! - [`RetrievalError`]: a nearest-neighbor lookup failed. Callers decide whether
//!   to degrade to an empty context or abort.
//! - [`IngestError`]: a dataset could not be read, embedded or stored.
//! - [`GenerationError`]: the completion endpoint failed. Caught by
//!   [`crate::api::ResponseGenerator::generate_response`] and turned into an apology string.
//!
//! Duplicate keys (an entity name that already exists, an edge that was already
//! persisted) are not errors here; see [`crate::store::InsertOutcome`].

use thiserror::Error;

/// Failure while ingesting a support dataset. The run's transaction is rolled
/// back, so nothing from the failed file is kept.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not read dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not embed row {row}: {source}")]
    Embedding {
        row: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure while loading or running the embedding model.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("model hub request failed: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),

    #[error("tensor operation failed: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("could not read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("expected a {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failure inside the vector-capable relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: diesel::ConnectionError,
    },

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("could not encode embedding: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("could not decode embedding of {table} row {id}: {source}")]
    Decode {
        table: &'static str,
        id: i32,
        #[source]
        source: bincode::error::DecodeError,
    },

    #[error("unknown entity type {0:?}")]
    UnknownEntityType(String),

    #[error("{table} row {id} has a {actual}-dimensional embedding, store expects {expected}")]
    Dimension {
        table: &'static str,
        id: i32,
        expected: usize,
        actual: usize,
    },

    #[error("got a {actual}-dimensional vector, store expects {expected}")]
    VectorDimension { expected: usize, actual: usize },
}

/// Failure while fetching nearest conversations or entities.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("top-k must be at least 1")]
    InvalidTopK,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not embed question: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Failure of the downstream completion call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion request failed: {0}")]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("completion returned no text")]
    EmptyResponse,

    /// Failure reported by a [`crate::api::Completer`] that does not speak the
    /// OpenAI protocol, carried as its message.
    #[error("{0}")]
    Provider(String),
}
