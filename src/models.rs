//! # Database models
//!
//! Typed records for the three relations of the support store, plus the
//! Diesel row structs they are decoded from.
//!
//! - [`Conversation`]: one prior question/answer pair with its embedding.
//! - [`Entity`]: a named domain term (product, issue, action, emotion). `name`
//!   is the natural key.
//! - [`Relationship`]: an undirected co-occurrence edge between two entities.
//!
//! Row structs (`*Row`, `New*`) mirror `crate::schema` exactly and carry the
//! embedding as an encoded blob. Conversion into the public records happens in
//! [`crate::store`], which is the only place that touches raw rows.
//!
//! ```no_run
//! use awful_support::models::{EntityType, NewEntity};
//!
//! let blob = vec![0u8; 16];
//! let entity = NewEntity {
//!     name: "refund",
//!     entity_type: EntityType::Action.as_str(),
//!     description: "action mentioned in customer interaction",
//!     embedding: &blob,
//! };
//! assert_eq!(entity.entity_type, "ACTION");
//! ```

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Relationship type written for every edge discovered by the graph builder.
pub const CO_OCCURRENCE: &str = "co_occurrence";

/// A stored customer-support exchange.
///
/// The embedding is derived from `user_input` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i32,
    pub user_input: String,
    pub bot_response: String,
    pub category: String,
    pub intent: String,
    pub embedding: Vec<f32>,
}

/// Kind of domain term an [`Entity`] names.
///
/// Persisted as the upper-case tag (`PRODUCT`, `ISSUE`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Product,
    Issue,
    Action,
    Emotion,
}

impl EntityType {
    /// All variants, in extraction order.
    pub const ALL: [EntityType; 4] = [
        EntityType::Product,
        EntityType::Issue,
        EntityType::Action,
        EntityType::Emotion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "PRODUCT",
            EntityType::Issue => "ISSUE",
            EntityType::Action => "ACTION",
            EntityType::Emotion => "EMOTION",
        }
    }

    /// Graphviz fill colour used when rendering the knowledge graph.
    pub fn color(&self) -> &'static str {
        match self {
            EntityType::Product => "lightblue",
            EntityType::Issue => "lightcoral",
            EntityType::Action => "lightgreen",
            EntityType::Emotion => "lightyellow",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRODUCT" => Ok(EntityType::Product),
            "ISSUE" => Ok(EntityType::Issue),
            "ACTION" => Ok(EntityType::Action),
            "EMOTION" => Ok(EntityType::Emotion),
            other => Err(StoreError::UnknownEntityType(other.to_string())),
        }
    }
}

/// A named domain term with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i32,
    pub name: String,
    pub entity_type: EntityType,
    pub description: String,
    pub embedding: Vec<f32>,
}

/// A persisted co-occurrence edge.
///
/// `source_entity_id` is always the lower of the two ids, so an unordered pair
/// maps to exactly one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_entity_id: i32,
    pub target_entity_id: i32,
    pub relationship_type: String,
    pub weight: f64,
}

/// Raw `conversations` row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::conversations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConversationRow {
    pub id: i32,
    pub user_input: String,
    pub bot_response: String,
    pub category: String,
    pub intent: String,
    pub embedding: Vec<u8>,
}

/// Insertable `conversations` row.
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::conversations)]
pub struct NewConversation<'a> {
    pub user_input: &'a str,
    pub bot_response: &'a str,
    pub category: &'a str,
    pub intent: &'a str,
    pub embedding: &'a [u8],
}

/// Raw `entities` row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::entities)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntityRow {
    pub id: i32,
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub embedding: Vec<u8>,
}

/// Insertable `entities` row.
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::entities)]
pub struct NewEntity<'a> {
    pub name: &'a str,
    pub entity_type: &'a str,
    pub description: &'a str,
    pub embedding: &'a [u8],
}

/// Raw `relationships` row.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::relationships)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RelationshipRow {
    pub id: i32,
    pub source_entity_id: i32,
    pub target_entity_id: i32,
    pub relationship_type: String,
    pub weight: f64,
}

/// Insertable `relationships` row.
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::relationships)]
pub struct NewRelationship<'a> {
    pub source_entity_id: i32,
    pub target_entity_id: i32,
    pub relationship_type: &'a str,
    pub weight: f64,
}

impl From<RelationshipRow> for Relationship {
    fn from(row: RelationshipRow) -> Self {
        Self {
            source_entity_id: row.source_entity_id,
            target_entity_id: row.target_entity_id,
            relationship_type: row.relationship_type,
            weight: row.weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_through_its_tag() {
        for ty in EntityType::ALL {
            assert_eq!(ty.as_str().parse::<EntityType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        let err = "PERSON".parse::<EntityType>().unwrap_err();
        assert!(matches!(err, StoreError::UnknownEntityType(ref t) if t == "PERSON"));
    }

    #[test]
    fn entity_type_serializes_upper_case() {
        let json = serde_json::to_string(&EntityType::Emotion).unwrap();
        assert_eq!(json, "\"EMOTION\"");
    }
}
