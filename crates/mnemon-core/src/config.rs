//! Engine Configuration
//!
//! Every tunable of the retrieval pipeline in one place, with the defaults
//! the engine ships with. All values can be overridden per engine instance;
//! none are read from the environment.

use std::time::Duration;

use crate::memory::LinkType;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default number of semantic candidates per fact-type partition
pub const DEFAULT_K_SEMANTIC: usize = 50;

/// Default minimum cosine similarity for semantic candidates
pub const DEFAULT_MIN_SEMANTIC_SIMILARITY: f32 = 0.4;

/// Default number of lexical (BM25) candidates per fact-type partition
pub const DEFAULT_K_LEXICAL: usize = 50;

/// Default number of graph entry points
pub const DEFAULT_ENTRY_COUNT: usize = 10;

/// Default minimum similarity for a semantic hit to seed the graph walk
pub const DEFAULT_ENTRY_THRESHOLD: f32 = 0.4;

/// Default minimum activation for a visited fact to be emitted
pub const DEFAULT_ACTIVATION_FLOOR: f32 = 0.05;

/// Activations are clamped to [0, ACTIVATION_CEILING]. Causal links may push
/// propagated activation above 1.0 before the clamp.
pub const ACTIVATION_CEILING: f32 = 2.0;

/// RRF dampening constant (k=60 is standard in information retrieval)
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Default cap on the fused candidate list
pub const DEFAULT_K_FUSE: usize = 100;

/// Default recency time constant: exp(-age_days / 180)
pub const DEFAULT_RECENCY_TAU_DAYS: f32 = 180.0;

/// Default per-call store deadline
pub const DEFAULT_STORE_DEADLINE: Duration = Duration::from_millis(500);

/// Default cross-encoder queue depth above which backpressure kicks in
pub const DEFAULT_QUEUE_THRESHOLD: usize = 8;

/// Upper bound on cross-encoder inference concurrency
pub const MAX_CROSS_ENCODER_CONCURRENCY: usize = 4;

// ============================================================================
// DECAY TABLE
// ============================================================================

/// Per-link-type activation decay factors for spreading activation.
///
/// Causal links carry a 2x boost (0.9 * 2.0 = 1.8) so causal chains can
/// amplify activation above the source value, up to [`ACTIVATION_CEILING`].
#[derive(Debug, Clone, Copy)]
pub struct DecayTable {
    /// Decay across entity links
    pub entity: f32,
    /// Decay across semantic links
    pub semantic: f32,
    /// Decay across temporal links
    pub temporal: f32,
    /// Decay across causal links (boosted)
    pub causal: f32,
}

impl Default for DecayTable {
    fn default() -> Self {
        Self {
            entity: 0.8,
            semantic: 0.7,
            temporal: 0.6,
            causal: 0.9 * 2.0,
        }
    }
}

impl DecayTable {
    /// Decay factor for a link type
    pub fn for_link(&self, link_type: LinkType) -> f32 {
        match link_type {
            LinkType::Entity => self.entity,
            LinkType::Semantic => self.semantic,
            LinkType::Temporal => self.temporal,
            LinkType::Causal => self.causal,
        }
    }
}

// ============================================================================
// COMPONENT CONFIGS
// ============================================================================

/// Configuration for the graph (spreading activation) strategies
#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    /// Number of semantic entry points to seed the walk
    pub entry_count: usize,
    /// Minimum similarity for an entry point
    pub entry_threshold: f32,
    /// Visited facts below this activation are not emitted
    pub activation_floor: f32,
    /// Per-link-type decay factors
    pub decay: DecayTable,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            entry_count: DEFAULT_ENTRY_COUNT,
            entry_threshold: DEFAULT_ENTRY_THRESHOLD,
            activation_floor: DEFAULT_ACTIVATION_FLOOR,
            decay: DecayTable::default(),
        }
    }
}

/// Relative weights of the reranker's score components.
/// Expected to sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct RerankWeights {
    /// Cross-encoder relevance
    pub cross_encoder: f32,
    /// Batch-normalized RRF score
    pub rrf: f32,
    /// Recency decay
    pub recency: f32,
    /// Entity-mention frequency
    pub frequency: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            cross_encoder: 0.6,
            rrf: 0.25,
            recency: 0.10,
            frequency: 0.05,
        }
    }
}

/// Configuration for the reranking stage
#[derive(Debug, Clone, Copy)]
pub struct RerankConfig {
    /// Score component weights
    pub weights: RerankWeights,
    /// Recency time constant in days
    pub recency_tau_days: f32,
    /// Cross-encoder inference concurrency (process-wide gate)
    pub concurrency: usize,
    /// Queue depth beyond which deadline slack is checked for backpressure
    pub queue_threshold: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            weights: RerankWeights::default(),
            recency_tau_days: DEFAULT_RECENCY_TAU_DAYS,
            concurrency: num_cpus::get().min(MAX_CROSS_ENCODER_CONCURRENCY),
            queue_threshold: DEFAULT_QUEUE_THRESHOLD,
        }
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Top-level engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Semantic candidates per fact-type partition
    pub k_semantic: usize,
    /// Minimum cosine similarity for semantic candidates
    pub min_semantic_similarity: f32,
    /// Lexical candidates per fact-type partition
    pub k_lexical: usize,
    /// Graph strategy tunables
    pub graph: GraphConfig,
    /// RRF dampening constant
    pub rrf_k: f64,
    /// Cap on the fused candidate list
    pub k_fuse: usize,
    /// Reranking tunables
    pub rerank: RerankConfig,
    /// Per-call store deadline
    pub store_deadline: Duration,
    /// Whether the temporal strategy admits facts without `occurred_start`
    /// by falling back to `mentioned_at`
    pub temporal_fallback_to_mentioned_at: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            k_semantic: DEFAULT_K_SEMANTIC,
            min_semantic_similarity: DEFAULT_MIN_SEMANTIC_SIMILARITY,
            k_lexical: DEFAULT_K_LEXICAL,
            graph: GraphConfig::default(),
            rrf_k: DEFAULT_RRF_K,
            k_fuse: DEFAULT_K_FUSE,
            rerank: RerankConfig::default(),
            store_deadline: DEFAULT_STORE_DEADLINE,
            temporal_fallback_to_mentioned_at: true,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
