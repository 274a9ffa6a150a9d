//! End-to-end test support for the mnemon retrieval engine.
//!
//! Provides deterministic substitutes for the engine's external
//! collaborators (store, embedder, cross-encoder) plus fixture builders, so
//! scenarios and properties run without a database or a model download.

pub mod mocks;
