//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces adapters must implement:
//! - Scorer / ScorerBackend: one LLM-backed evaluator and its transport
//! - SnapshotProvider: repository acquisition
//! - KeyValueStore: persistence with an atomic conditional-write primitive
//!
//! These traits keep the orchestration core independent of concrete
//! infrastructure.

pub mod scorer;
pub mod snapshot_provider;
pub mod store;

pub use scorer::{BackendResponse, EvaluationContext, Scorer, ScorerBackend, ScorerEvaluation};
pub use snapshot_provider::SnapshotProvider;
pub use store::{ConditionalOutcome, KeyValueStore, PredicateFn, UpdateFn};
