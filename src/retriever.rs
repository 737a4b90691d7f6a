//! # Similarity retriever
//!
//! Embeds a question once and asks the [`SupportStore`] for the nearest
//! conversations and entities. Results come back in ascending distance, ties
//! broken by ascending id.
//!
//! A question that is empty after trimming is not embedded at all: it yields an
//! empty result instead of an error. A `k` of zero is rejected with
//! [`RetrievalError::InvalidTopK`].
//!
//! Retrieval is read-only. Store and embedding failures surface as
//! [`RetrievalError`]; whether to fall back to an empty context is the caller's
//! call (see [`crate::api::ResponseGenerator::generate_response`]).

use tracing::debug;

use crate::error::RetrievalError;
use crate::models::{Conversation, Entity};
use crate::store::{Neighbor, SupportStore};
use crate::vector_store::Embedder;

/// Everything retrieved for one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub conversations: Vec<Neighbor<Conversation>>,
    pub entities: Vec<Neighbor<Entity>>,
}

/// Nearest-neighbour lookups keyed by question text.
pub struct SimilarityRetriever<'a, E: Embedder> {
    embedder: &'a E,
}

impl<'a, E: Embedder> SimilarityRetriever<'a, E> {
    pub fn new(embedder: &'a E) -> Self {
        Self { embedder }
    }

    /// The `k` stored conversations closest to `question`.
    pub fn retrieve_conversations(
        &self,
        store: &mut SupportStore,
        question: &str,
        k: usize,
    ) -> Result<Vec<Neighbor<Conversation>>, RetrievalError> {
        check_k(k)?;
        match self.embed_question(question)? {
            Some(query) => Ok(store.nearest_conversations(&query, k)?),
            None => Ok(Vec::new()),
        }
    }

    /// The `k` stored entities closest to `question`.
    pub fn retrieve_entities(
        &self,
        store: &mut SupportStore,
        question: &str,
        k: usize,
    ) -> Result<Vec<Neighbor<Entity>>, RetrievalError> {
        check_k(k)?;
        match self.embed_question(question)? {
            Some(query) => Ok(store.nearest_entities(&query, k)?),
            None => Ok(Vec::new()),
        }
    }

    /// Both lookups against a single embedding of `question`.
    pub fn retrieve(
        &self,
        store: &mut SupportStore,
        question: &str,
        conversation_k: usize,
        entity_k: usize,
    ) -> Result<RetrievedContext, RetrievalError> {
        check_k(conversation_k)?;
        check_k(entity_k)?;
        let Some(query) = self.embed_question(question)? else {
            return Ok(RetrievedContext::default());
        };

        let context = RetrievedContext {
            conversations: store.nearest_conversations(&query, conversation_k)?,
            entities: store.nearest_entities(&query, entity_k)?,
        };
        debug!(
            "Retrieved {} conversations and {} entities",
            context.conversations.len(),
            context.entities.len()
        );
        Ok(context)
    }

    fn embed_question(&self, question: &str) -> Result<Option<Vec<f32>>, RetrievalError> {
        let question = question.trim();
        if question.is_empty() {
            debug!("Blank question, skipping retrieval");
            return Ok(None);
        }
        Ok(Some(self.embedder.encode(question)?))
    }
}

fn check_k(k: usize) -> Result<(), RetrievalError> {
    if k == 0 {
        return Err(RetrievalError::InvalidTopK);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::EntityType;
    use crate::store::{ConversationDraft, EntityDraft};
    use crate::test_support::{HashEmbedder, TEST_DIMENSION, memory_store};

    fn seeded_store(embedder: &HashEmbedder) -> SupportStore {
        let mut store = memory_store();
        let questions = [
            ("I want a refund for my subscription", "We can process a refund."),
            ("How do I reset my password", "Use the reset link on the login page."),
            ("My account is locked", "We unlocked your account."),
            ("Cancel my plan please", "Your plan has been cancelled."),
        ];
        for (user_input, bot_response) in questions {
            store
                .insert_conversation(&ConversationDraft {
                    user_input: user_input.to_string(),
                    bot_response: bot_response.to_string(),
                    category: "general".to_string(),
                    intent: "unknown".to_string(),
                    embedding: embedder.encode(user_input).unwrap(),
                })
                .unwrap();
        }
        for (name, entity_type) in [
            ("refund", EntityType::Action),
            ("subscription", EntityType::Product),
            ("account", EntityType::Product),
        ] {
            store
                .insert_entity_if_absent(&EntityDraft {
                    name: name.to_string(),
                    entity_type,
                    description: format!("{} mentioned", name),
                    embedding: embedder.encode(name).unwrap(),
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn returns_min_k_n_results_in_distance_order() {
        let embedder = HashEmbedder::default();
        let mut store = seeded_store(&embedder);
        let retriever = SimilarityRetriever::new(&embedder);

        for k in 1..=6 {
            let hits = retriever
                .retrieve_conversations(&mut store, "refund my subscription", k)
                .unwrap();
            assert_eq!(hits.len(), k.min(4));
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[test]
    fn closest_conversation_shares_the_most_words() {
        let embedder = HashEmbedder::default();
        let mut store = seeded_store(&embedder);
        let retriever = SimilarityRetriever::new(&embedder);

        let hits = retriever
            .retrieve_conversations(&mut store, "I want a refund for my subscription", 1)
            .unwrap();
        assert_eq!(hits[0].record.user_input, "I want a refund for my subscription");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn entity_lookup_prefers_exact_name() {
        let embedder = HashEmbedder::default();
        let mut store = seeded_store(&embedder);
        let retriever = SimilarityRetriever::new(&embedder);

        let hits = retriever.retrieve_entities(&mut store, "account", 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].record.name, "account");
    }

    #[test]
    fn blank_question_yields_empty_results() {
        let embedder = HashEmbedder::default();
        let mut store = seeded_store(&embedder);
        let retriever = SimilarityRetriever::new(&embedder);

        assert!(retriever.retrieve_conversations(&mut store, "   \n", 3).unwrap().is_empty());
        assert!(retriever.retrieve_entities(&mut store, "", 3).unwrap().is_empty());
        assert_eq!(
            retriever.retrieve(&mut store, "\t", 5, 3).unwrap(),
            RetrievedContext::default()
        );
    }

    #[test]
    fn zero_k_is_rejected() {
        let embedder = HashEmbedder::default();
        let mut store = memory_store();
        let retriever = SimilarityRetriever::new(&embedder);

        assert!(matches!(
            retriever.retrieve_conversations(&mut store, "hello", 0),
            Err(RetrievalError::InvalidTopK)
        ));
        assert!(matches!(
            retriever.retrieve(&mut store, "hello", 5, 0),
            Err(RetrievalError::InvalidTopK)
        ));
    }

    #[test]
    fn empty_store_returns_empty_context() {
        let embedder = HashEmbedder::default();
        let mut store = memory_store();
        let retriever = SimilarityRetriever::new(&embedder);

        let context = retriever.retrieve(&mut store, "hello", 5, 3).unwrap();
        assert!(context.conversations.is_empty());
        assert!(context.entities.is_empty());
    }

    #[test]
    fn embedder_and_store_dimension_mismatch_is_a_store_error() {
        let embedder = HashEmbedder::with_dimension(TEST_DIMENSION + 1);
        let mut store = memory_store();
        let retriever = SimilarityRetriever::new(&embedder);

        let err = retriever.retrieve_conversations(&mut store, "hello", 1).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Store(StoreError::VectorDimension { .. })
        ));
    }

    #[test]
    fn combined_retrieval_matches_individual_calls() {
        let embedder = HashEmbedder::default();
        let mut store = seeded_store(&embedder);
        let retriever = SimilarityRetriever::new(&embedder);
        let question = "locked account refund";

        let combined = retriever.retrieve(&mut store, question, 2, 2).unwrap();
        let conversations = retriever.retrieve_conversations(&mut store, question, 2).unwrap();
        let entities = retriever.retrieve_entities(&mut store, question, 2).unwrap();
        assert_eq!(combined.conversations, conversations);
        assert_eq!(combined.entities, entities);
    }
}
