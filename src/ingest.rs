//! # Dataset ingestion
//!
//! Loads a customer-support CSV, cleans each exchange, pulls out entities from
//! a fixed vocabulary and writes everything to the [`SupportStore`] in one
//! transaction.
//!
//! Expected columns:
//!
//! | column | required | default |
//! |--------|----------|---------|
//! | `user_input` | yes | empty |
//! | `bot_response` | yes | empty |
//! | `category` | no | `general` |
//! | `intent` | no | `unknown` |
//!
//! Each conversation is embedded from its cleaned `user_input`; each entity from
//! its name. Entities already in the store keep their first description and
//! embedding.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::models::EntityType;
use crate::store::{BatchSummary, ConversationDraft, EntityDraft, SupportStore};
use crate::vector_store::Embedder;

pub const DEFAULT_CATEGORY: &str = "general";
pub const DEFAULT_INTENT: &str = "unknown";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static DISALLOWED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s.,!?-]").expect("valid regex"));

static ENTITY_PATTERNS: Lazy<Vec<(EntityType, Regex)>> = Lazy::new(|| {
    [
        (EntityType::Product, r"\b(account|subscription|service|plan|package)\b"),
        (EntityType::Issue, r"\b(problem|issue|error|bug|complaint)\b"),
        (EntityType::Action, r"\b(cancel|refund|upgrade|downgrade|reset)\b"),
        (EntityType::Emotion, r"\b(frustrated|happy|angry|satisfied|disappointed)\b"),
    ]
    .into_iter()
    .map(|(entity_type, pattern)| (entity_type, Regex::new(pattern).expect("valid regex")))
    .collect()
});

/// One row of the support dataset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SupportRecord {
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub bot_response: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
}

/// An entity mention found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
}

impl ExtractedEntity {
    pub fn description(&self) -> String {
        format!(
            "{} mentioned in customer interaction",
            self.entity_type.as_str().to_lowercase()
        )
    }
}

/// Collapse whitespace runs, drop characters outside `\w \s . , ! ? -`, trim.
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text, " ");
    DISALLOWED_RE.replace_all(&collapsed, "").trim().to_string()
}

/// Whole-word vocabulary matches in `text`, grouped by type, in match order.
/// Repeated mentions are repeated in the output.
pub fn extract_entities(text: &str) -> Vec<ExtractedEntity> {
    let lowered = text.to_lowercase();
    ENTITY_PATTERNS
        .iter()
        .flat_map(|(entity_type, re)| {
            re.find_iter(&lowered).map(move |m| ExtractedEntity {
                name: m.as_str().to_string(),
                entity_type: *entity_type,
            })
        })
        .collect()
}

/// Parse support records from any CSV source with a header row.
pub fn read_dataset<R: Read>(source: R) -> Result<Vec<SupportRecord>, IngestError> {
    collect_records(csv::Reader::from_reader(source))
}

/// Parse support records from a CSV file.
pub fn load_dataset(path: &Path) -> Result<Vec<SupportRecord>, IngestError> {
    info!("Loading dataset: {}", path.display());
    let records = collect_records(csv::Reader::from_path(path)?)?;
    debug!("Loaded {} records", records.len());
    Ok(records)
}

fn collect_records<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<SupportRecord>, IngestError> {
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Turns dataset rows into stored conversations and entities.
pub struct DataProcessor<'a, E: Embedder> {
    embedder: &'a E,
    show_progress: bool,
}

impl<'a, E: Embedder> DataProcessor<'a, E> {
    pub fn new(embedder: &'a E) -> Self {
        Self {
            embedder,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Load `path` and store its contents.
    pub fn ingest_file(
        &self,
        store: &mut SupportStore,
        path: &Path,
    ) -> Result<BatchSummary, IngestError> {
        let records = load_dataset(path)?;
        self.process_and_store(store, &records)
    }

    /// Clean, extract, embed and store `records`. Nothing is written unless
    /// every row succeeds.
    pub fn process_and_store(
        &self,
        store: &mut SupportStore,
        records: &[SupportRecord],
    ) -> Result<BatchSummary, IngestError> {
        let progress = self.progress_bar(records.len());

        let mut conversation_drafts = Vec::with_capacity(records.len());
        let mut entity_drafts = Vec::new();
        let mut seen_entities = HashSet::new();

        for (row, record) in records.iter().enumerate() {
            let user_input = clean_text(&record.user_input);
            let bot_response = clean_text(&record.bot_response);

            let embedding = self
                .embedder
                .encode(&user_input)
                .map_err(|source| IngestError::Embedding { row, source })?;

            let new_entities: Vec<ExtractedEntity> =
                extract_entities(&format!("{} {}", user_input, bot_response))
                    .into_iter()
                    .filter(|entity| seen_entities.insert(entity.name.clone()))
                    .collect();
            let names: Vec<&str> = new_entities.iter().map(|e| e.name.as_str()).collect();
            let embeddings = self
                .embedder
                .encode_batch(&names)
                .map_err(|source| IngestError::Embedding { row, source })?;

            for (entity, embedding) in new_entities.into_iter().zip(embeddings) {
                entity_drafts.push(EntityDraft {
                    description: entity.description(),
                    name: entity.name,
                    entity_type: entity.entity_type,
                    embedding,
                });
            }

            conversation_drafts.push(ConversationDraft {
                user_input,
                bot_response,
                category: non_empty_or(&record.category, DEFAULT_CATEGORY),
                intent: non_empty_or(&record.intent, DEFAULT_INTENT),
                embedding,
            });
            progress.inc(1);
        }

        progress.finish_with_message("embedded");
        Ok(store.store_batch(&conversation_drafts, &entity_drafts)?)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(len as u64);
        let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress.set_style(style);
        progress.set_message("embedding conversations");
        progress
    }
}

fn non_empty_or(value: &Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::test_support::{BrokenEmbedder, HashEmbedder, memory_store};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(user_input: &str, bot_response: &str) -> SupportRecord {
        SupportRecord {
            user_input: user_input.to_string(),
            bot_response: bot_response.to_string(),
            category: None,
            intent: None,
        }
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Hello,\n\n world!!  @#$ "), "Hello, world!!");
        assert_eq!(clean_text("re-set my plan?"), "re-set my plan?");
        assert_eq!(clean_text("refund @ now"), "refund  now");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_extract_entities_groups_by_type() {
        let entities = extract_entities("I want a REFUND for my subscription, I'm angry");
        let found: Vec<(&str, EntityType)> = entities
            .iter()
            .map(|e| (e.name.as_str(), e.entity_type))
            .collect();
        assert_eq!(
            found,
            vec![
                ("subscription", EntityType::Product),
                ("refund", EntityType::Action),
                ("angry", EntityType::Emotion),
            ]
        );
        assert_eq!(entities[1].description(), "action mentioned in customer interaction");
    }

    #[test]
    fn test_extract_entities_whole_words_only() {
        assert!(extract_entities("planning a packaged servicing").is_empty());
        assert_eq!(extract_entities("plan, plan.").len(), 2);
    }

    #[test]
    fn test_read_dataset_applies_defaults() {
        let csv = "user_input,bot_response,category\n\
                   I want a refund,We can process a refund.,billing\n\
                   Hello,Hi there,\n";
        let records = read_dataset(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category.as_deref(), Some("billing"));
        assert_eq!(records[0].intent, None);
        assert_eq!(non_empty_or(&records[1].category, DEFAULT_CATEGORY), "general");
        assert_eq!(non_empty_or(&records[1].intent, DEFAULT_INTENT), "unknown");
    }

    #[test]
    fn test_load_dataset_missing_file() {
        let result = load_dataset(Path::new("definitely/not/here.csv"));
        assert!(matches!(result, Err(IngestError::Csv(_))));
    }

    #[test]
    fn test_ingest_then_graph_links_cooccurring_entities() {
        let embedder = HashEmbedder::default();
        let mut store = memory_store();
        let processor = DataProcessor::new(&embedder).with_progress(false);

        let summary = processor
            .process_and_store(
                &mut store,
                &[record("I want a refund for my subscription", "We can process a refund.")],
            )
            .unwrap();
        assert_eq!(summary.conversations, 1);
        assert_eq!(summary.entities_inserted, 2);

        let conversations = store.all_conversations().unwrap();
        assert_eq!(conversations[0].category, "general");
        assert_eq!(conversations[0].intent, "unknown");
        assert_eq!(
            conversations[0].embedding,
            embedder.encode("I want a refund for my subscription").unwrap()
        );

        let refund = store.entity_by_name("refund").unwrap().unwrap();
        let subscription = store.entity_by_name("subscription").unwrap().unwrap();
        assert_eq!(refund.entity_type, EntityType::Action);
        assert_eq!(subscription.description, "product mentioned in customer interaction");
        assert_eq!(refund.embedding, embedder.encode("refund").unwrap());
        assert_eq!(subscription.embedding, embedder.encode("subscription").unwrap());

        let graph = GraphBuilder::default().build_graph(&mut store).unwrap();
        assert_eq!(graph.weight_between(refund.id, subscription.id), Some(0.1));
    }

    #[test]
    fn test_reingest_keeps_first_entities() {
        let embedder = HashEmbedder::default();
        let mut store = memory_store();
        let processor = DataProcessor::new(&embedder).with_progress(false);
        let rows = [
            record("My account has a bug", "We fixed the bug."),
            record("Reset my account", "Done."),
        ];

        let first = processor.process_and_store(&mut store, &rows).unwrap();
        assert_eq!(first.entities_inserted, 3);
        assert_eq!(first.entities_skipped, 0);

        let second = processor.process_and_store(&mut store, &rows).unwrap();
        assert_eq!(second.conversations, 2);
        assert_eq!(second.entities_inserted, 0);
        assert_eq!(second.entities_skipped, 3);
        assert_eq!(store.all_entities().unwrap().len(), 3);
        assert_eq!(store.all_conversations().unwrap().len(), 4);
    }

    #[test]
    fn test_embedding_failure_stores_nothing() {
        let mut store = memory_store();
        let processor = DataProcessor::new(&BrokenEmbedder).with_progress(false);

        let result = processor.process_and_store(&mut store, &[record("refund", "ok")]);
        assert!(matches!(result, Err(IngestError::Embedding { row: 0, .. })));
        assert!(store.all_conversations().unwrap().is_empty());
        assert!(store.all_entities().unwrap().is_empty());
    }

    #[test]
    fn test_ingest_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "user_input,bot_response,category,intent\n\
             \"I am frustrated,   my plan was cancelled\",Sorry about that!,account,complaint"
        )
        .unwrap();

        let embedder = HashEmbedder::default();
        let mut store = memory_store();
        let summary = DataProcessor::new(&embedder)
            .with_progress(false)
            .ingest_file(&mut store, temp_file.path())
            .unwrap();

        assert_eq!(summary.conversations, 1);
        let conversation = &store.all_conversations().unwrap()[0];
        assert_eq!(conversation.user_input, "I am frustrated, my plan was cancelled");
        assert_eq!(conversation.category, "account");
        assert_eq!(conversation.intent, "complaint");
        let names: Vec<String> = store.all_entities().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["plan".to_string(), "frustrated".to_string()]);
    }
}
