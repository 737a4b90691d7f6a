//! # Response generation
//!
//! The last hop of a question: retrieve context, render the prompt, call the
//! completion endpoint.
//!
//! - [`Completer`] is the seam to any text-completion backend.
//! - [`OpenAiCompleter`] speaks the OpenAI-compatible chat completions API via
//!   `async-openai` (works against local servers too, see `api_base`).
//! - [`ResponseGenerator`] wires an [`Embedder`], a [`Completer`] and a
//!   [`PromptTemplate`] together.
//!
//! Generation never fails outward. A retrieval failure degrades to an empty
//! context; a completion failure becomes a fixed apology string carrying the
//! error text.
//!
//! # Example
//!
//! ```no_run
//! use awful_support::api::{OpenAiCompleter, ResponseGenerator};
//! use awful_support::config::SupportConfig;
//! use awful_support::store::SupportStore;
//! use awful_support::vector_store::SentenceEmbeddingsModel;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SupportConfig::default();
//! let embedder = SentenceEmbeddingsModel::load(&config.embedding_model)?;
//! let completer = OpenAiCompleter::new(&config);
//! let mut store = SupportStore::open(&config.db_url, config.embedding_dimension, config.distance_metric)?;
//!
//! let answer = ResponseGenerator::new(&embedder, &completer)
//!     .generate_response(&mut store, "How do I get a refund?")
//!     .await;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use tiktoken_rs::cl100k_base;
use tracing::{debug, error, warn};

use crate::{
    config::SupportConfig,
    context,
    error::GenerationError,
    retriever::{RetrievedContext, SimilarityRetriever},
    store::SupportStore,
    template::PromptTemplate,
    vector_store::Embedder,
};

pub const DEFAULT_CONVERSATION_TOP_K: usize = 5;
pub const DEFAULT_ENTITY_TOP_K: usize = 3;

/// A text-completion backend: prompt in, answer out.
#[allow(async_fn_in_trait)]
pub trait Completer {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Creates a new OpenAI API client from configuration.
fn create_client(config: &SupportConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    debug!("Client created with config: {:?}", openai_config);
    Client::with_config(openai_config)
}

/// Single-turn chat completion against an OpenAI-compatible endpoint.
pub struct OpenAiCompleter {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u16,
    stop_words: Vec<String>,
    prompt_budget: usize,
}

impl OpenAiCompleter {
    pub fn new(config: &SupportConfig) -> Self {
        Self {
            client: create_client(config),
            model: config.model.clone(),
            max_tokens: config.context_max_tokens,
            stop_words: config.stop_words.clone(),
            prompt_budget: prompt_budget(config),
        }
    }
}

impl Completer for OpenAiCompleter {
    #[allow(deprecated)]
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Some(tokens) = count_tokens(prompt) {
            debug!("Prompt is {} tokens", tokens);
            if tokens > self.prompt_budget {
                warn!(
                    "Prompt is {} tokens, over the {} token budget; the endpoint may truncate it",
                    tokens, self.prompt_budget
                );
            }
        }

        let message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        });

        let mut args = CreateChatCompletionRequestArgs::default();
        args.max_tokens(self.max_tokens)
            .model(self.model.clone())
            .messages(vec![message]);
        if !self.stop_words.is_empty() {
            args.stop(self.stop_words.clone());
        }
        let request = args.build()?;

        debug!("Sending request: {:?}", request);
        let response = self.client.chat().create(request).await?;

        let mut response_string = String::new();
        for chat_choice in response.choices {
            if let Some(message_text) = chat_choice.message.content {
                response_string.push_str(&message_text);
            }
        }

        if response_string.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(response_string)
    }
}

/// Tokens left for the prompt once the answer's reservation is taken out.
fn prompt_budget(config: &SupportConfig) -> usize {
    let reserved = config.assistant_minimum_context_tokens.max(0) as usize;
    (config.context_max_tokens as usize).saturating_sub(reserved)
}

/// Number of `cl100k_base` tokens in `text`, if the tokenizer is available.
fn count_tokens(text: &str) -> Option<usize> {
    match cl100k_base() {
        Ok(bpe) => Some(bpe.encode_with_special_tokens(text).len()),
        Err(e) => {
            debug!("Tokenizer unavailable, skipping prompt budget check: {}", e);
            None
        }
    }
}

/// The text returned in place of an answer when the completer fails.
pub fn apology(error: &GenerationError) -> String {
    format!("Sorry, I am having trouble generating a response right now! Error: {error}")
}

/// Retrieval-augmented answering over a [`SupportStore`].
pub struct ResponseGenerator<'a, E: Embedder, C: Completer> {
    embedder: &'a E,
    completer: &'a C,
    template: PromptTemplate,
    conversation_top_k: usize,
    entity_top_k: usize,
}

impl<'a, E: Embedder, C: Completer> ResponseGenerator<'a, E, C> {
    pub fn new(embedder: &'a E, completer: &'a C) -> Self {
        Self {
            embedder,
            completer,
            template: PromptTemplate::default(),
            conversation_top_k: DEFAULT_CONVERSATION_TOP_K,
            entity_top_k: DEFAULT_ENTITY_TOP_K,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_top_k(mut self, conversation_top_k: usize, entity_top_k: usize) -> Self {
        self.conversation_top_k = conversation_top_k;
        self.entity_top_k = entity_top_k;
        self
    }

    /// Retrieve context for `question` and render the full prompt.
    ///
    /// A retrieval failure is logged and the prompt is built over an empty
    /// context instead.
    pub fn build_prompt(&self, store: &mut SupportStore, question: &str) -> String {
        let retrieved = SimilarityRetriever::new(self.embedder)
            .retrieve(store, question, self.conversation_top_k, self.entity_top_k)
            .unwrap_or_else(|e| {
                warn!("Retrieval failed, answering without context: {}", e);
                RetrievedContext::default()
            });

        let context = context::assemble(
            retrieved.conversations.iter().map(|n| &n.record),
            retrieved.entities.iter().map(|n| &n.record),
        );
        self.template.render(&context, question)
    }

    /// Answer `question`. Always returns text: the completion, or an apology.
    pub async fn generate_response(&self, store: &mut SupportStore, question: &str) -> String {
        let prompt = self.build_prompt(store, question);
        match self.completer.complete(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Generation failed: {}", e);
                apology(&e)
            }
        }
    }
}
