//! Gavel - Hackathon Judging Orchestration Core
//!
//! Gavel runs AI scorers against hackathon submissions and turns their raw
//! output into auditable, budget-capped judging results: batch jobs fan out
//! a closed set of scorers over repository snapshots, every cited piece of
//! evidence is verified against the snapshot before it can influence a score,
//! and every backend invocation is metered against a hard spending cap.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models (submissions, jobs, scores, costs)
//!   and ports (scorer backend, snapshot provider, key-value store)
//! - **Service Layer** (`services`): the job coordinator pipeline, score
//!   aggregation, evidence validation, cost ledger, and budget guard
//! - **Adapter Layer** (`adapters`): prompt-based scorers, the mock backend,
//!   and the in-memory store
//! - **Infrastructure Layer** (`infrastructure`): configuration loading,
//!   logging setup, and the backend retry policy
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gavel::{ConfigLoader, JobCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     gavel::infrastructure::logging::init(&config.logging)?;
//!     // Wire scorers, snapshot provider, and store, then:
//!     // let coordinator = Arc::new(JobCoordinator::new(config, scorers, provider, store)?);
//!     // coordinator.trigger_job(hackathon_id, None).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::backends::{MockBackend, MockReply};
pub use adapters::scorers::{build_scorers, PromptScorer};
pub use adapters::store::MemoryStore;
pub use domain::errors::{DomainResult, OrchestratorError};
pub use domain::models::{
    AggregatedScore, Config, CostRecord, CostScope, Evidence, EvidenceSeverity, FailureReason,
    Job, JobProgress, JobStatus, Recommendation, RepoSnapshot, Rubric, RubricDimension,
    ScoreBands, ScoreResult, ScorerConfig, SnapshotFile, Submission, SubmissionStatus,
};
pub use domain::ports::{
    ConditionalOutcome, KeyValueStore, Scorer, ScorerBackend, SnapshotProvider,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::retry::RetryPolicy;
pub use services::{
    BudgetGuard, CostLedger, JobCoordinator, JobStatusView, JobTicket, SubmissionResultView,
};
