//! Domain errors for the judging orchestration core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while orchestrating an analysis run.
///
/// The containment policy is smallest-scope-first: a scorer failure is
/// contained to that scorer, then to its submission, and only whole-batch
/// conditions (pre-flight budget rejection, single-flight collision) surface
/// at the job level.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The scorer backend timed out or was throttled. Transient; retried by
    /// the backend-layer retry policy, never by the coordinator.
    #[error("Scorer backend error ({scorer}): {message}")]
    ScorerBackend { scorer: String, message: String },

    /// The backend returned output that failed structured parsing, even after
    /// the single corrective re-request. Terminal for that scorer/submission.
    #[error("Scorer '{scorer}' returned unparseable output: {message}")]
    ScorerParse { scorer: String, message: String },

    /// The budget guard denied a reservation. The scorer call is skipped,
    /// not retried.
    #[error("Budget reservation denied for {parent_id}: {requested:.4} USD would exceed cap")]
    BudgetDenied { parent_id: Uuid, requested: f64 },

    /// The pre-flight estimate rejected the entire batch.
    #[error("Estimated cost {estimated_max:.2} USD exceeds budget cap {cap:.2} USD")]
    BudgetExceeded { estimated_max: f64, cap: f64 },

    /// Another job already holds the running slot for this parent entity.
    /// Surfaced to the caller that lost the race; must not be auto-retried.
    #[error("A job is already running for parent entity {0}")]
    JobConflict(Uuid),

    /// The snapshot provider could not produce a repository snapshot.
    /// Fails that submission fast; other submissions are unaffected.
    #[error("Repository snapshot unavailable for submission {submission_id}: {message}")]
    SnapshotUnavailable { submission_id: Uuid, message: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Submission not found: {0}")]
    SubmissionNotFound(Uuid),

    #[error("No pending submissions to analyze for parent entity {0}")]
    NoSubmissions(Uuid),

    /// The job was cancelled. Terminal; never retried.
    #[error("cancelled")]
    Cancelled,

    #[error("Rubric validation failed: {0}")]
    InvalidRubric(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    /// Whether this error is transient from the backend's perspective and
    /// thus eligible for backend-layer retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ScorerBackend { .. } | Self::Store(_))
    }
}

pub type DomainResult<T> = Result<T, OrchestratorError>;

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}
