//! Fact - The fundamental unit of memory
//!
//! Each fact is an immutable natural-language statement owned by exactly one
//! bank, carrying a dense embedding, optional occurrence timestamps, and
//! references to the entities it mentions. Facts are connected into a typed
//! directed graph by [`Link`]s; retrieval reads that graph but never writes it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque fact identifier. Stable for the life of the fact.
pub type FactId = String;

/// Opaque bank identifier. Banks are the isolation boundary for all reads.
pub type BankId = String;

/// Opaque entity identifier.
pub type EntityId = String;

// ============================================================================
// FACT TYPES
// ============================================================================

/// The kind of a fact.
///
/// A tagged sum, not a hierarchy: only opinions carry extra state (their
/// confidence), which lives on [`Fact::confidence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    /// Objective claim about the world
    #[default]
    World,
    /// An action the owning bank took
    Bank,
    /// A belief, with a confidence in [0, 1]
    Opinion,
    /// A synthesized summary produced by background jobs
    Observation,
    /// A recorded event
    Experience,
}

impl FactType {
    /// All fact types, in canonical order
    pub const ALL: [FactType; 5] = [
        FactType::World,
        FactType::Bank,
        FactType::Opinion,
        FactType::Observation,
        FactType::Experience,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::World => "world",
            FactType::Bank => "bank",
            FactType::Opinion => "opinion",
            FactType::Observation => "observation",
            FactType::Experience => "experience",
        }
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "world" => Ok(FactType::World),
            "bank" => Ok(FactType::Bank),
            "opinion" => Ok(FactType::Opinion),
            "observation" => Ok(FactType::Observation),
            "experience" => Ok(FactType::Experience),
            _ => Err(format!("Unknown fact type: {}", s)),
        }
    }
}

// ============================================================================
// FACT
// ============================================================================

/// An immutable memory unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    /// Unique identifier
    pub id: FactId,
    /// Owning bank
    pub bank_id: BankId,
    /// Kind of fact
    pub fact_type: FactType,
    /// The natural-language statement
    pub text: String,
    /// Optional free-text context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Dense embedding. Dimension is uniform within a bank and read from the
    /// store. Never serialized back to callers.
    #[serde(default, skip_serializing)]
    pub embedding: Vec<f32>,
    /// When the described event started (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_start: Option<DateTime<Utc>>,
    /// When the described event ended (equal to start for point events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_end: Option<DateTime<Utc>>,
    /// When the fact was ingested
    pub mentioned_at: DateTime<Utc>,
    /// Provenance: source document (opaque to retrieval)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Provenance: source chunk (opaque to retrieval)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    /// Entities mentioned by this fact (same bank only)
    #[serde(default)]
    pub entity_refs: Vec<EntityId>,
    /// Optional scalar tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Optional scalar metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Confidence in [0, 1]. Only meaningful for opinions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Fact {
    /// The timestamp used when time-filtering this fact: `occurred_start`,
    /// falling back to `mentioned_at`.
    pub fn occurred_or_mentioned(&self) -> DateTime<Utc> {
        self.occurred_start.unwrap_or(self.mentioned_at)
    }

    /// Approximate token cost of returning this fact to a caller:
    /// `ceil(len(text) / 4) + ceil(len(context) / 4)`.
    pub fn token_cost(&self) -> usize {
        let context_len = self.context.as_deref().map_or(0, str::len);
        self.text.len().div_ceil(4) + context_len.div_ceil(4)
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// A canonical referent (person, place, thing, concept) shared across facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique identifier
    pub id: EntityId,
    /// Owning bank
    pub bank_id: BankId,
    /// Canonical display name
    pub canonical_name: String,
    /// Number of facts mentioning this entity (per-bank)
    pub mention_count: i64,
    /// First time the entity was seen
    pub first_seen: DateTime<Utc>,
    /// Most recent time the entity was seen
    pub last_seen: DateTime<Utc>,
}

/// A sidecar payload of observation facts about an entity, token-capped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityObservation {
    /// The entity
    pub entity_id: EntityId,
    /// Canonical display name
    pub canonical_name: String,
    /// Observation facts mentioning the entity, newest first
    pub observations: Vec<ObservedFact>,
}

/// One observation inside an [`EntityObservation`] payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedFact {
    /// The observation fact
    pub fact_id: FactId,
    /// Its text
    pub text: String,
    /// When it was ingested
    pub mentioned_at: DateTime<Utc>,
}

// ============================================================================
// LINKS
// ============================================================================

/// Type of a directed edge between two facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Temporal relationship (happened before/after)
    Temporal,
    /// Semantically related (similar meaning/topic)
    Semantic,
    /// Shared entity
    Entity,
    /// Causal relationship (A caused B)
    Causal,
}

impl LinkType {
    /// All link types, in canonical order
    pub const ALL: [LinkType; 4] = [
        LinkType::Temporal,
        LinkType::Semantic,
        LinkType::Entity,
        LinkType::Causal,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Temporal => "temporal",
            LinkType::Semantic => "semantic",
            LinkType::Entity => "entity",
            LinkType::Causal => "causal",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "temporal" => Ok(LinkType::Temporal),
            "semantic" => Ok(LinkType::Semantic),
            "entity" => Ok(LinkType::Entity),
            "causal" => Ok(LinkType::Causal),
            _ => Err(format!("Unknown link type: {}", s)),
        }
    }
}

/// A directed weighted edge between two facts in the same bank.
///
/// Links are redundant inferences over the fact set; retrieval reads them
/// but never writes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// Source fact
    pub source_id: FactId,
    /// Target fact
    pub target_id: FactId,
    /// Kind of relationship
    pub link_type: LinkType,
    /// Edge weight in (0, 1]
    pub weight: f32,
}

// ============================================================================
// TESTS
// ============================================================================
