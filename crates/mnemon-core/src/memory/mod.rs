//! Memory module - Core types and data structures
//!
//! Implements the memory data model:
//! - Facts (immutable memory units) with a typed sum for their kind
//! - Entities (canonical referents connecting facts into a graph)
//! - Typed weighted links between facts
//! - Temporal ranges used for time-scoped retrieval

mod fact;

pub use fact::{
    BankId, Entity, EntityId, EntityObservation, Fact, FactId, FactType, Link, LinkType,
    ObservedFact,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// TEMPORAL RANGE
// ============================================================================

/// An inclusive time range, as resolved by the query analyzer or supplied
/// to the store adapter as a retrieval filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalRange {
    /// Start of the range (inclusive)
    pub start: DateTime<Utc>,
    /// End of the range (inclusive)
    pub end: DateTime<Utc>,
}

impl TemporalRange {
    /// Create a range, normalizing an inverted pair
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Whether a timestamp falls within the range (inclusive on both ends)
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

// ============================================================================
// TESTS
// ============================================================================
