//! Submission domain model.
//!
//! A submission is one team's entry in a judging run. Its status walks a
//! forward-only pipeline; transitions are validated against an explicit table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::score::AggregatedScore;

/// Status of a submission in the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Submission is registered but no job has picked it up.
    Pending,
    /// The repository snapshot is being acquired.
    Cloning,
    /// Scorers are running against the snapshot.
    Analyzing,
    /// All scorers settled and an aggregated score was produced.
    Completed,
    /// The submission could not be analyzed.
    Failed,
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status. The pipeline only moves forward.
    pub fn valid_transitions(&self) -> Vec<SubmissionStatus> {
        match self {
            Self::Pending => vec![Self::Cloning, Self::Failed],
            Self::Cloning => vec![Self::Analyzing, Self::Failed],
            Self::Analyzing => vec![Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Structured reason attached to a failed submission, naming the scorers or
/// pipeline step that failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureReason {
    /// Pipeline step where the failure occurred (e.g. "snapshot", "scoring").
    pub step: String,
    /// Per-scorer failure messages, empty when the step itself failed.
    pub scorer_errors: Vec<String>,
}

impl FailureReason {
    pub fn step(step: impl Into<String>) -> Self {
        Self { step: step.into(), scorer_errors: Vec::new() }
    }

    pub fn scoring(errors: Vec<String>) -> Self {
        Self { step: "scoring".to_string(), scorer_errors: errors }
    }
}

/// One team's entry in a judging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    /// Parent entity (hackathon) this submission belongs to.
    pub parent_id: Uuid,
    /// Opaque reference handed to the snapshot provider.
    pub repo_ref: String,
    pub team_name: String,
    pub status: SubmissionStatus,
    /// Final result; None until the submission completes.
    pub score: Option<AggregatedScore>,
    /// Set when the submission fails.
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(parent_id: Uuid, repo_ref: impl Into<String>, team_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_id,
            repo_ref: repo_ref.into(),
            team_name: team_name.into(),
            status: SubmissionStatus::Pending,
            score: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the submission to `new_status`, enforcing the forward-only
    /// transition table.
    pub fn transition_to(&mut self, new_status: SubmissionStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(OrchestratorError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the submission completed with its aggregated score.
    pub fn complete(&mut self, score: AggregatedScore) -> DomainResult<()> {
        self.transition_to(SubmissionStatus::Completed)?;
        self.score = Some(score);
        Ok(())
    }

    /// Mark the submission failed with a structured reason.
    pub fn fail(&mut self, reason: FailureReason) -> DomainResult<()> {
        self.transition_to(SubmissionStatus::Failed)?;
        self.failure = Some(reason);
        Ok(())
    }
}
