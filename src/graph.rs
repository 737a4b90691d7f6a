//! # Co-occurrence knowledge graph
//!
//! Builds an undirected, weighted graph of entities from the conversations they
//! appear in together, and persists the discovered edges.
//!
//! ## Algorithm
//!
//! For every unordered pair of distinct entities `(a, b)`, count the conversations
//! in which both names appear as a case-insensitive substring of either
//! `user_input` or `bot_response`. Pairs with a count above zero become edges with
//! `weight = count / 10.0`.
//!
//! Two strategies produce identical edges and weights:
//!
//! - [`CooccurrenceStrategy::Scan`]: the direct O(E²·C) pairwise scan. Fine for the
//!   small entity vocabularies this is built for.
//! - [`CooccurrenceStrategy::InvertedIndex`]: first maps every entity to the sorted ids
//!   of the conversations mentioning it, then intersects those lists per pair.
//!
//! The graph is rebuilt from scratch on every call; it is a pure function of the
//! entity and conversation tables at build time. Each edge is upserted on its
//! `(source, target, type)` key: an unchanged edge is left alone, a changed count
//! refreshes the stored weight, and repeated builds never duplicate rows.
//!
//! ```no_run
//! use awful_support::graph::GraphBuilder;
//! use awful_support::store::SupportStore;
//! use awful_support::vector_store::Metric;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SupportStore::open("support.db", 384, Metric::Euclidean)?;
//! let graph = GraphBuilder::default().build_graph(&mut store)?;
//! println!("{} entities, {} edges", graph.node_count(), graph.edge_count());
//! std::fs::write("knowledge_graph.dot", graph.to_dot())?;
//! # Ok(()) }
//! ```

use petgraph::dot::{Config, Dot};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{CO_OCCURRENCE, Conversation, Entity, EntityType, Relationship};
use crate::store::{InsertOutcome, SupportStore, ordered_pair};

/// Divisor turning a raw co-occurrence count into an edge weight.
pub const WEIGHT_SCALE: f64 = 10.0;

const GRAPH_TITLE: &str = "Customer Support Knowledge Graph";

/// How pairwise co-occurrence counts are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CooccurrenceStrategy {
    #[default]
    Scan,
    InvertedIndex,
}

/// Graph node: the identifying part of an [`Entity`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    pub id: i32,
    pub name: String,
    pub entity_type: EntityType,
}

impl fmt::Display for EntityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Graph edge: how often two entities appeared together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoOccurrence {
    pub count: usize,
    pub weight: f64,
}

impl CoOccurrence {
    fn from_count(count: usize) -> Self {
        Self {
            count,
            weight: count as f64 / WEIGHT_SCALE,
        }
    }
}

impl fmt::Display for CoOccurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.weight)
    }
}

/// In-memory view of entities and their co-occurrence edges.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    graph: UnGraph<EntityNode, CoOccurrence>,
    by_id: HashMap<i32, NodeIndex>,
}

impl KnowledgeGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &EntityNode> {
        self.graph.node_weights()
    }

    /// Weight of the edge between two entities, if they co-occur.
    pub fn weight_between(&self, a: i32, b: i32) -> Option<f64> {
        let (a, b) = (self.by_id.get(&a)?, self.by_id.get(&b)?);
        self.graph
            .find_edge(*a, *b)
            .map(|edge| self.graph[edge].weight)
    }

    /// Every edge as a [`Relationship`], lower id first, sorted by `(source, target)`.
    pub fn relationships(&self) -> Vec<Relationship> {
        let mut edges: Vec<Relationship> = self
            .graph
            .edge_references()
            .map(|edge| {
                let (source, target) =
                    ordered_pair(self.graph[edge.source()].id, self.graph[edge.target()].id);
                Relationship {
                    source_entity_id: source,
                    target_entity_id: target,
                    relationship_type: CO_OCCURRENCE.to_string(),
                    weight: edge.weight().weight,
                }
            })
            .collect();
        edges.sort_by_key(|edge| (edge.source_entity_id, edge.target_entity_id));
        edges
    }

    /// Up to `top_k` neighbours of `entity_id`, heaviest edge first, ties by id.
    pub fn neighbors(&self, entity_id: i32, top_k: usize) -> Vec<(&EntityNode, f64)> {
        let Some(&ix) = self.by_id.get(&entity_id) else {
            return Vec::new();
        };
        let mut related: Vec<(&EntityNode, f64)> = self
            .graph
            .edges(ix)
            .map(|edge| {
                let other = if edge.source() == ix { edge.target() } else { edge.source() };
                (&self.graph[other], edge.weight().weight)
            })
            .collect();
        related.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.id.cmp(&b.0.id)));
        related.truncate(top_k);
        related
    }

    /// Render as Graphviz DOT, nodes filled by entity type, edge width by weight.
    pub fn to_dot(&self) -> String {
        let body = Dot::with_attr_getters(
            &self.graph,
            &[Config::EdgeNoLabel, Config::NodeNoLabel, Config::GraphContentOnly],
            &|_, edge| format!("penwidth = {:.2}", 1.0 + edge.weight().weight * 2.0),
            &|_, (_, node)| {
                format!(
                    "label = {:?}, style = filled, fillcolor = {}",
                    node.name,
                    node.entity_type.color()
                )
            },
        );
        format!("graph {{\n    label = {GRAPH_TITLE:?}\n    labelloc = t\n{body}}}\n")
    }

    fn add_entity(&mut self, entity: &Entity) {
        let ix = self.graph.add_node(EntityNode {
            id: entity.id,
            name: entity.name.clone(),
            entity_type: entity.entity_type,
        });
        self.by_id.insert(entity.id, ix);
    }

    fn add_cooccurrence(&mut self, a: i32, b: i32, count: usize) {
        if let (Some(&a), Some(&b)) = (self.by_id.get(&a), self.by_id.get(&b)) {
            self.graph.add_edge(a, b, CoOccurrence::from_count(count));
        }
    }
}

/// Recomputes the knowledge graph from the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    strategy: CooccurrenceStrategy,
}

impl GraphBuilder {
    pub fn with_strategy(strategy: CooccurrenceStrategy) -> Self {
        Self { strategy }
    }

    /// Build the graph from every stored entity and conversation without
    /// writing anything back.
    pub fn load_graph(&self, store: &mut SupportStore) -> Result<KnowledgeGraph, StoreError> {
        let entities = store.all_entities()?;
        let conversations = store.all_conversations()?;
        info!(
            "Building knowledge graph from {} entities and {} conversations ({:?})",
            entities.len(),
            conversations.len(),
            self.strategy
        );
        Ok(assemble_graph(&entities, &conversations, self.strategy))
    }

    /// Build the graph from every stored entity and conversation and persist its edges.
    pub fn build_graph(&self, store: &mut SupportStore) -> Result<KnowledgeGraph, StoreError> {
        let graph = self.load_graph(store)?;

        let (mut inserted, mut updated, mut unchanged) = (0usize, 0usize, 0usize);
        for relationship in graph.relationships() {
            match store.upsert_relationship(&relationship)? {
                InsertOutcome::Inserted => inserted += 1,
                InsertOutcome::Updated => updated += 1,
                InsertOutcome::AlreadyPresent => unchanged += 1,
            }
        }
        info!(
            "Knowledge graph has {} edges ({} new, {} reweighted, {} unchanged)",
            graph.edge_count(),
            inserted,
            updated,
            unchanged
        );

        Ok(graph)
    }
}

/// Build the in-memory graph without touching the store.
pub fn assemble_graph(
    entities: &[Entity],
    conversations: &[Conversation],
    strategy: CooccurrenceStrategy,
) -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::default();
    for entity in entities {
        graph.add_entity(entity);
    }
    for (i, j, count) in cooccurrence_counts(entities, conversations, strategy) {
        graph.add_cooccurrence(entities[i].id, entities[j].id, count);
    }
    graph
}

/// `(i, j, count)` for every pair of entity positions `i < j` with `count > 0`.
pub fn cooccurrence_counts(
    entities: &[Entity],
    conversations: &[Conversation],
    strategy: CooccurrenceStrategy,
) -> Vec<(usize, usize, usize)> {
    let texts: Vec<LoweredConversation> = conversations.iter().map(LoweredConversation::new).collect();
    let names: Vec<String> = entities.iter().map(|e| e.name.to_lowercase()).collect();

    let counts = match strategy {
        CooccurrenceStrategy::Scan => scan_counts(&names, &texts),
        CooccurrenceStrategy::InvertedIndex => indexed_counts(&names, &texts),
    };
    debug!("{} co-occurring entity pairs", counts.len());
    counts
}

/// A conversation's two text fields, lowercased once.
struct LoweredConversation {
    user_input: String,
    bot_response: String,
}

impl LoweredConversation {
    fn new(conversation: &Conversation) -> Self {
        Self {
            user_input: conversation.user_input.to_lowercase(),
            bot_response: conversation.bot_response.to_lowercase(),
        }
    }

    // TODO: plain substring matching over-matches names contained in longer words
    // ("plan" inside "planning"); a tokenized mode would change stored weights, so it
    // needs to be an explicit opt-in.
    fn mentions(&self, name: &str) -> bool {
        self.user_input.contains(name) || self.bot_response.contains(name)
    }
}

fn scan_counts(names: &[String], texts: &[LoweredConversation]) -> Vec<(usize, usize, usize)> {
    let mut counts = Vec::new();
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let count = texts
                .iter()
                .filter(|text| text.mentions(&names[i]) && text.mentions(&names[j]))
                .count();
            if count > 0 {
                counts.push((i, j, count));
            }
        }
    }
    counts
}

fn indexed_counts(names: &[String], texts: &[LoweredConversation]) -> Vec<(usize, usize, usize)> {
    let postings: Vec<Vec<usize>> = names
        .iter()
        .map(|name| {
            texts
                .iter()
                .enumerate()
                .filter(|(_, text)| text.mentions(name))
                .map(|(position, _)| position)
                .collect()
        })
        .collect();

    let mut counts = Vec::new();
    for i in 0..names.len() {
        if postings[i].is_empty() {
            continue;
        }
        for j in (i + 1)..names.len() {
            let count = intersection_len(&postings[i], &postings[j]);
            if count > 0 {
                counts.push((i, j, count));
            }
        }
    }
    counts
}

/// Size of the intersection of two ascending lists.
fn intersection_len(a: &[usize], b: &[usize]) -> usize {
    let (mut i, mut j, mut shared) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    shared
}
