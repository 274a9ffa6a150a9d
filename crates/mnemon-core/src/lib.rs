//! # Mnemon Core
//!
//! Memory retrieval engine for AI assistants. Given a natural-language query
//! against a per-bank knowledge store of facts linked in a typed graph, it
//! returns a ranked, token-budgeted list of the facts that best answer the
//! query:
//!
//! - **Four parallel strategies**: semantic (vector), lexical (BM25),
//!   graph spreading activation, and a temporal-graph variant for queries
//!   with a detected time range
//! - **Reciprocal Rank Fusion**: merges the strategies' rankings across
//!   fact-type partitions
//! - **Cross-encoder reranking**: temporal-aware inputs, recency and
//!   frequency signals, token-budgeted assembly
//! - **Reproducible traces**: every ranking decision recorded, deterministic
//!   for a fixed snapshot, plan and seed
//!
//! Banks are the isolation boundary: every read is scoped by bank id, and
//! cross-bank reads fail. The engine owns no persistent state - it reads the
//! store through the [`Store`] trait, and treats embedding and cross-encoder
//! models as external collaborators behind the [`Embedder`] and
//! [`CrossEncoder`] traits.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mnemon_core::{RecallEngine, RecallOptions, SqliteStore};
//! use mnemon_core::{LocalCrossEncoder, LocalEmbedder};
//!
//! let store = Arc::new(SqliteStore::new(None)?);
//! let engine = RecallEngine::new(
//!     store,
//!     Arc::new(LocalEmbedder::new()),
//!     Arc::new(LocalCrossEncoder::new()),
//! );
//!
//! let response = engine
//!     .recall("my-bank", "Where does Alice work?", RecallOptions::default())
//!     .await?;
//! for result in &response.results {
//!     println!("{:.3}  {}", result.final_score, result.text);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): bundle SQLite for the reference store adapter
//! - `embeddings`: fastembed-backed [`LocalEmbedder`] and [`LocalCrossEncoder`]
//! - `vector-search`: HNSW acceleration (USearch) for the reference adapter
//! - `fixtures`: test-support writers on the SQLite adapter
//! - `full`: everything above

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod analyzer;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod fusion;
pub mod memory;
pub mod rerank;
pub mod retrieval;
pub mod storage;
pub mod trace;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use memory::{
    BankId, Entity, EntityId, EntityObservation, Fact, FactId, FactType, Link, LinkType,
    ObservedFact, TemporalRange,
};

// Engine
pub use engine::{
    derive_seed, Budget, RecallEngine, RecallError, RecallOptions, RecallResponse, RecallResult,
};

// Configuration
pub use config::{DecayTable, EngineConfig, GraphConfig, RerankConfig, RerankWeights};

// Store adapter
pub use storage::{SqliteStore, Store, StoreError, VectorFilter};

// Analyzer
pub use analyzer::{detect_temporal_range, QueryAnalyzer, QueryPlan};

// External collaborator seams
pub use embeddings::{cosine_similarity, Embedder, EmbeddingError};
pub use rerank::{CrossEncoder, RerankError, ScoreComponents};

// Trace
pub use trace::{
    RerankTraceEntry, RetrievalTrace, RetrievalTraceResult, RrfTraceEntry, Trace, TraceQuery,
    TraceSummary, VisitRecord,
};

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub use embeddings::{LocalCrossEncoder, LocalEmbedder};
