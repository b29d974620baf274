//! Scorer and scorer-backend ports.
//!
//! A scorer is one independent LLM-backed evaluator producing a partial score
//! and evidence for one rubric dimension. The backend is the raw transport
//! underneath it; both are out-of-process collaborators hidden behind traits.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RepoSnapshot, ScoreResult};

/// Context handed to a scorer for one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub submission_id: uuid::Uuid,
    pub team_name: String,
}

/// A scorer's structured output together with the token usage that produced
/// it, so the invocation can be costed by the ledger.
#[derive(Debug, Clone)]
pub struct ScorerEvaluation {
    pub score: ScoreResult,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Uniform contract wrapping one external scoring backend.
///
/// Implementations form a fixed closed set selected by configuration at job
/// setup; dispatch is never by runtime type inspection.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// The scorer's name (e.g. "security").
    fn name(&self) -> &str;

    /// The rubric dimension this scorer contributes to.
    fn dimension(&self) -> &str;

    /// Model identifier this scorer invokes the backend with.
    fn model(&self) -> &str;

    /// Evaluate one submission snapshot, returning a structured score.
    ///
    /// A malformed backend response gets exactly one corrective re-request
    /// before the invocation is treated as failed.
    async fn evaluate(
        &self,
        ctx: &EvaluationContext,
        snapshot: &RepoSnapshot,
    ) -> DomainResult<ScorerEvaluation>;
}

/// Raw response from the scorer backend transport.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Out-of-scope LLM transport. Timeouts and throttling surface as
/// [`OrchestratorError::ScorerBackend`](crate::domain::errors::OrchestratorError),
/// distinguishable from parse failures which are diagnosed by the adapter.
#[async_trait]
pub trait ScorerBackend: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        context: &str,
        model: &str,
    ) -> DomainResult<BackendResponse>;
}
