//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `SupportConfig` struct, which holds the configuration parameters,
//! a `load_config` function to load the configuration from a file, and
//! `establish_connection` for opening the SQLite database the store lives in.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use awful_support::config::{SupportConfig, load_config};
//!
//! let config_file_path = "/path/to/config.yaml";
//! let config: SupportConfig = load_config(config_file_path).unwrap();
//! println!("{:?}", config);
//! ```

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::{error::Error, fs};
use tracing::*;

use crate::error::StoreError;
use crate::vector_store::{DEFAULT_DIMENSION, DEFAULT_MODEL, Metric};

/// Represents the application's configuration.
///
/// Holds the completion endpoint settings, the database location and the
/// retrieval knobs. Everything below `stop_words` has a default so older config
/// files keep loading.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct SupportConfig {
    /// The API key used to authenticate requests to the API.
    pub api_key: String,

    /// The base URL of the API.
    pub api_base: String,

    /// The name of the model to be used for generating responses.
    pub model: String,

    // Completion budget of the model.
    pub context_max_tokens: u16,

    // Tokens the answer should always have room for.
    pub assistant_minimum_context_tokens: i32,

    // Stop words
    #[serde(default)]
    pub stop_words: Vec<String>,

    /// SQLite database holding conversations, entities and relationships.
    #[serde(default = "default_db_url")]
    pub db_url: String,

    /// Hugging Face id of the sentence embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Length every stored embedding must have.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Distance used for all nearest-neighbour queries against `db_url`.
    #[serde(default)]
    pub distance_metric: Metric,

    /// How many similar conversations go into the prompt.
    #[serde(default = "default_conversation_top_k")]
    pub conversation_top_k: usize,

    /// How many related entities go into the prompt.
    #[serde(default = "default_entity_top_k")]
    pub entity_top_k: usize,

    /// Name of a prompt template under `<config_dir>/templates/`.
    #[serde(default)]
    pub template: Option<String>,
}

fn default_db_url() -> String {
    "support.db".to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_embedding_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_conversation_top_k() -> usize {
    5
}

fn default_entity_top_k() -> usize {
    3
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            api_key: "CHANGEME".to_string(),
            api_base: "http://localhost:5001/v1".to_string(),
            model: "mistral-7b-openorca".to_string(),
            context_max_tokens: 1024,
            assistant_minimum_context_tokens: 256,
            stop_words: Vec::new(),
            db_url: default_db_url(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            distance_metric: Metric::default(),
            conversation_top_k: default_conversation_top_k(),
            entity_top_k: default_entity_top_k(),
            template: None,
        }
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Parameters
///
/// - `file`: The path to the YAML configuration file.
///
/// # Returns
///
/// - `Ok(SupportConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: &str) -> Result<SupportConfig, Box<dyn Error>> {
    debug!("Loading config from {}", file);
    let content = fs::read_to_string(file)?;
    let config: SupportConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Open a SQLite connection to `db_url`.
pub fn establish_connection(db_url: &str) -> Result<SqliteConnection, StoreError> {
    SqliteConnection::establish(db_url).map_err(|source| StoreError::Connection {
        url: db_url.to_string(),
        source,
    })
}
