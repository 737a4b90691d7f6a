//! # Support store
//!
//! The vector-capable relational store behind retrieval and graph building.
//!
//! Three relations live in one SQLite database:
//!
//! - `conversations`: prior question/answer pairs with an embedding of the question.
//! - `entities`: domain terms, `name` unique, each with an embedding of its name.
//! - `relationships`: co-occurrence edges between two distinct entities, unique per
//!   `(source_entity_id, target_entity_id, relationship_type)`.
//!
//! Embeddings are stored as bincode-encoded `Vec<f32>` blobs. Nearest-neighbour
//! queries are an exact scan ranked in Rust, so a query for `k` rows over a table of
//! `n` rows always yields `min(k, n)` rows in ascending distance, ties broken by
//! ascending `id`.
//!
//! A [`SupportStore`] owns one connection. Open it at the start of an operation,
//! pass it down explicitly and let it drop when the operation ends.
//!
//! ```no_run
//! use awful_support::store::{ConversationDraft, SupportStore};
//! use awful_support::vector_store::Metric;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SupportStore::open("support.db", 3, Metric::Euclidean)?;
//! store.insert_conversation(&ConversationDraft {
//!     user_input: "I want a refund".into(),
//!     bot_response: "We can process a refund.".into(),
//!     category: "billing".into(),
//!     intent: "refund".into(),
//!     embedding: vec![0.1, 0.2, 0.3],
//! })?;
//! let nearest = store.nearest_conversations(&[0.1, 0.2, 0.3], 1)?;
//! assert_eq!(nearest.len(), 1);
//! # Ok(()) }
//! ```

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::{debug, info};

use crate::config::establish_connection;
use crate::error::StoreError;
use crate::models::{
    Conversation, ConversationRow, Entity, EntityRow, EntityType, NewConversation, NewEntity,
    NewRelationship, Relationship, RelationshipRow,
};
use crate::schema::{conversations, entities, relationships};
use crate::vector_store::Metric;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    user_input TEXT NOT NULL,
    bot_response TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    intent TEXT NOT NULL DEFAULT 'unknown',
    embedding BLOB NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    embedding BLOB NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    source_entity_id INTEGER NOT NULL REFERENCES entities(id),
    target_entity_id INTEGER NOT NULL REFERENCES entities(id),
    relationship_type TEXT NOT NULL,
    weight DOUBLE NOT NULL DEFAULT 1.0 CHECK (weight >= 0),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CHECK (source_entity_id <> target_entity_id),
    UNIQUE (source_entity_id, target_entity_id, relationship_type)
);
"#;

/// Result of a write against a unique key.
///
/// `AlreadyPresent` means the row existed and was left untouched. Entities are
/// first write wins; edges report `Updated` when a rebuild changed their weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
    Updated,
}

/// A record paired with its distance from the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<T> {
    pub record: T,
    pub distance: f32,
}

/// A conversation that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationDraft {
    pub user_input: String,
    pub bot_response: String,
    pub category: String,
    pub intent: String,
    pub embedding: Vec<f32>,
}

/// An entity that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDraft {
    pub name: String,
    pub entity_type: EntityType,
    pub description: String,
    pub embedding: Vec<f32>,
}

/// Row counts written by [`SupportStore::store_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub conversations: usize,
    pub entities_inserted: usize,
    pub entities_skipped: usize,
}

/// Scoped handle on the support database.
pub struct SupportStore {
    conn: SqliteConnection,
    dimension: usize,
    metric: Metric,
}

impl SupportStore {
    /// Open (and if needed initialise) the database at `db_url`.
    ///
    /// `dimension` is enforced on every write and query; `metric` ranks every
    /// nearest-neighbour query made through this handle.
    pub fn open(db_url: &str, dimension: usize, metric: Metric) -> Result<Self, StoreError> {
        let mut conn = establish_connection(db_url)?;
        conn.batch_execute(CREATE_TABLES)?;
        debug!("Opened support store at {} ({:?}, {}d)", db_url, metric, dimension);
        Ok(Self {
            conn,
            dimension,
            metric,
        })
    }

    /// Insert a conversation and return its id.
    pub fn insert_conversation(&mut self, draft: &ConversationDraft) -> Result<i32, StoreError> {
        insert_conversation(&mut self.conn, self.dimension, draft)
    }

    /// Insert an entity unless one with the same name exists.
    pub fn insert_entity_if_absent(&mut self, draft: &EntityDraft) -> Result<InsertOutcome, StoreError> {
        insert_entity_if_absent(&mut self.conn, self.dimension, draft)
    }

    /// Persist an edge, or refresh the weight of the stored
    /// `(source, target, type)` row.
    ///
    /// The pair is normalised so `source_entity_id < target_entity_id`. Writing
    /// an edge that is already stored with the same weight changes nothing and
    /// is reported as [`InsertOutcome::AlreadyPresent`], never as an error.
    pub fn upsert_relationship(
        &mut self,
        relationship: &Relationship,
    ) -> Result<InsertOutcome, StoreError> {
        let (source, target) = ordered_pair(
            relationship.source_entity_id,
            relationship.target_entity_id,
        );
        let key = format!("{source}-{target}");

        self.conn.transaction::<_, StoreError, _>(|conn| {
            let stored: Option<f64> = relationships::table
                .filter(relationships::source_entity_id.eq(source))
                .filter(relationships::target_entity_id.eq(target))
                .filter(relationships::relationship_type.eq(&relationship.relationship_type))
                .select(relationships::weight)
                .first(conn)
                .optional()?;

            if stored == Some(relationship.weight) {
                return Ok(outcome(0, "relationship", &key));
            }

            let row = NewRelationship {
                source_entity_id: source,
                target_entity_id: target,
                relationship_type: &relationship.relationship_type,
                weight: relationship.weight,
            };
            diesel::insert_into(relationships::table)
                .values(&row)
                .on_conflict((
                    relationships::source_entity_id,
                    relationships::target_entity_id,
                    relationships::relationship_type,
                ))
                .do_update()
                .set(relationships::weight.eq(excluded(relationships::weight)))
                .execute(conn)?;

            Ok(match stored {
                None => InsertOutcome::Inserted,
                Some(previous) => {
                    debug!(
                        "relationship {:?} weight {} -> {}",
                        key, previous, relationship.weight
                    );
                    InsertOutcome::Updated
                }
            })
        })
    }

    /// Write a batch of conversations and entities in one transaction.
    pub fn store_batch(
        &mut self,
        conversation_drafts: &[ConversationDraft],
        entity_drafts: &[EntityDraft],
    ) -> Result<BatchSummary, StoreError> {
        let dimension = self.dimension;
        let summary = self.conn.transaction::<_, StoreError, _>(|conn| {
            let mut summary = BatchSummary::default();
            for draft in conversation_drafts {
                insert_conversation(conn, dimension, draft)?;
                summary.conversations += 1;
            }
            for draft in entity_drafts {
                match insert_entity_if_absent(conn, dimension, draft)? {
                    InsertOutcome::Inserted => summary.entities_inserted += 1,
                    InsertOutcome::AlreadyPresent | InsertOutcome::Updated => {
                        summary.entities_skipped += 1
                    }
                }
            }
            Ok(summary)
        })?;
        info!(
            "Stored {} conversations, {} new entities ({} already known)",
            summary.conversations, summary.entities_inserted, summary.entities_skipped
        );
        Ok(summary)
    }

    /// Every conversation, ordered by id.
    pub fn all_conversations(&mut self) -> Result<Vec<Conversation>, StoreError> {
        let rows = conversations::table
            .order(conversations::id.asc())
            .select(ConversationRow::as_select())
            .load(&mut self.conn)?;
        rows.into_iter()
            .map(|row| self.decode_conversation(row))
            .collect()
    }

    /// Every entity, ordered by id.
    pub fn all_entities(&mut self) -> Result<Vec<Entity>, StoreError> {
        let rows = entities::table
            .order(entities::id.asc())
            .select(EntityRow::as_select())
            .load(&mut self.conn)?;
        rows.into_iter().map(|row| self.decode_entity(row)).collect()
    }

    /// Look up an entity by its natural key.
    pub fn entity_by_name(&mut self, name: &str) -> Result<Option<Entity>, StoreError> {
        let row = entities::table
            .filter(entities::name.eq(name))
            .select(EntityRow::as_select())
            .first(&mut self.conn)
            .optional()?;
        row.map(|row| self.decode_entity(row)).transpose()
    }

    /// Every persisted edge, ordered by `(source, target)`.
    pub fn relationships(&mut self) -> Result<Vec<Relationship>, StoreError> {
        let rows = relationships::table
            .order((
                relationships::source_entity_id.asc(),
                relationships::target_entity_id.asc(),
            ))
            .select(RelationshipRow::as_select())
            .load(&mut self.conn)?;
        Ok(rows.into_iter().map(Relationship::from).collect())
    }

    /// The `k` conversations whose embeddings are closest to `query`.
    pub fn nearest_conversations(
        &mut self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor<Conversation>>, StoreError> {
        self.check_dimension(query)?;
        let candidates = self.all_conversations()?;
        Ok(rank_nearest(candidates, query, k, self.metric, |c| {
            (c.id, c.embedding.as_slice())
        }))
    }

    /// The `k` entities whose embeddings are closest to `query`.
    pub fn nearest_entities(
        &mut self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor<Entity>>, StoreError> {
        self.check_dimension(query)?;
        let candidates = self.all_entities()?;
        Ok(rank_nearest(candidates, query, k, self.metric, |e| {
            (e.id, e.embedding.as_slice())
        }))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::VectorDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn decode_conversation(&self, row: ConversationRow) -> Result<Conversation, StoreError> {
        let embedding = decode_embedding("conversations", row.id, &row.embedding, self.dimension)?;
        Ok(Conversation {
            id: row.id,
            user_input: row.user_input,
            bot_response: row.bot_response,
            category: row.category,
            intent: row.intent,
            embedding,
        })
    }

    fn decode_entity(&self, row: EntityRow) -> Result<Entity, StoreError> {
        let embedding = decode_embedding("entities", row.id, &row.embedding, self.dimension)?;
        Ok(Entity {
            id: row.id,
            name: row.name,
            entity_type: row.entity_type.parse()?,
            description: row.description,
            embedding,
        })
    }
}

fn insert_conversation(
    conn: &mut SqliteConnection,
    dimension: usize,
    draft: &ConversationDraft,
) -> Result<i32, StoreError> {
    let blob = encode_embedding(&draft.embedding, dimension)?;
    let row = NewConversation {
        user_input: &draft.user_input,
        bot_response: &draft.bot_response,
        category: &draft.category,
        intent: &draft.intent,
        embedding: &blob,
    };
    let id: i32 = diesel::insert_into(conversations::table)
        .values(&row)
        .returning(conversations::id)
        .get_result(conn)?;
    Ok(id)
}

fn insert_entity_if_absent(
    conn: &mut SqliteConnection,
    dimension: usize,
    draft: &EntityDraft,
) -> Result<InsertOutcome, StoreError> {
    let blob = encode_embedding(&draft.embedding, dimension)?;
    let row = NewEntity {
        name: &draft.name,
        entity_type: draft.entity_type.as_str(),
        description: &draft.description,
        embedding: &blob,
    };
    let written = diesel::insert_or_ignore_into(entities::table)
        .values(&row)
        .execute(conn)?;
    Ok(outcome(written, "entity", &draft.name))
}

fn outcome(rows_written: usize, what: &str, key: &str) -> InsertOutcome {
    if rows_written == 0 {
        debug!("{} {:?} already present, keeping existing row", what, key);
        InsertOutcome::AlreadyPresent
    } else {
        InsertOutcome::Inserted
    }
}

fn encode_embedding(embedding: &[f32], dimension: usize) -> Result<Vec<u8>, StoreError> {
    if embedding.len() != dimension {
        return Err(StoreError::VectorDimension {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    Ok(bincode::serde::encode_to_vec(embedding, bincode::config::standard())?)
}

fn decode_embedding(
    table: &'static str,
    id: i32,
    blob: &[u8],
    dimension: usize,
) -> Result<Vec<f32>, StoreError> {
    let (embedding, _): (Vec<f32>, usize) =
        bincode::serde::decode_from_slice(blob, bincode::config::standard())
            .map_err(|source| StoreError::Decode { table, id, source })?;
    if embedding.len() != dimension {
        return Err(StoreError::Dimension {
            table,
            id,
            expected: dimension,
            actual: embedding.len(),
        });
    }
    Ok(embedding)
}

/// `(min, max)` of two ids.
pub(crate) fn ordered_pair(a: i32, b: i32) -> (i32, i32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Rank `candidates` by distance to `query`, keep the closest `k`.
///
/// Equal distances are ordered by ascending id so results are reproducible.
fn rank_nearest<T, F>(
    candidates: Vec<T>,
    query: &[f32],
    k: usize,
    metric: Metric,
    key: F,
) -> Vec<Neighbor<T>>
where
    F: Fn(&T) -> (i32, &[f32]),
{
    let mut scored: Vec<(f32, i32, T)> = candidates
        .into_iter()
        .map(|candidate| {
            let (id, distance) = {
                let (id, embedding) = key(&candidate);
                (id, metric.distance(query, embedding))
            };
            (distance, id, candidate)
        })
        .collect();

    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(distance, _, record)| Neighbor { record, distance })
        .collect()
}
