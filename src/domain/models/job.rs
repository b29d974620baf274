//! Job domain model.
//!
//! A job is one batch-analysis run over a set of submissions for a parent
//! entity. The single-flight invariant (at most one non-terminal job per
//! parent) is enforced by the coordinator, not by this model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};

/// Status of a batch-analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    /// The job could not proceed at all (e.g. the whole batch was rejected by
    /// the pre-flight budget check). Individual submission failures do not
    /// put a job here.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn valid_transitions(&self) -> Vec<JobStatus> {
        match self {
            Self::Queued => vec![Self::Running, Self::Failed],
            Self::Running => vec![Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Progress counters for a running job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobProgress {
    pub completed: u32,
    pub failed: u32,
    pub total: u32,
}

impl JobProgress {
    pub fn settled(&self) -> u32 {
        self.completed + self.failed
    }

    pub fn is_done(&self) -> bool {
        self.settled() >= self.total
    }
}

/// One batch-analysis run over a set of submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// The hackathon this job analyzes submissions for.
    pub parent_id: Uuid,
    pub status: JobStatus,
    pub progress: JobProgress,
    /// Running cost total in USD, reconciled from the cost ledger.
    pub cost_usd: f64,
    pub submission_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the job fails as a whole.
    pub error: Option<String>,
}

impl Job {
    pub fn new(parent_id: Uuid, submission_ids: Vec<Uuid>) -> Self {
        let total = u32::try_from(submission_ids.len()).unwrap_or(u32::MAX);
        Self {
            id: Uuid::new_v4(),
            parent_id,
            status: JobStatus::Queued,
            progress: JobProgress { completed: 0, failed: 0, total },
            cost_usd: 0.0,
            submission_ids,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn transition_to(&mut self, new_status: JobStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(OrchestratorError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        self.status = new_status;
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::new(Uuid::new_v4(), vec![Uuid::new_v4()]);
        assert_eq!(job.status, JobStatus::Queued);
        job.transition_to(JobStatus::Running).unwrap();
        job.transition_to(JobStatus::Completed).unwrap();
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_completed_job_is_frozen() {
        let mut job = Job::new(Uuid::new_v4(), vec![]);
        job.transition_to(JobStatus::Running).unwrap();
        job.transition_to(JobStatus::Completed).unwrap();
        assert!(job.transition_to(JobStatus::Running).is_err());
    }

    #[test]
    fn test_progress_done() {
        let progress = JobProgress { completed: 2, failed: 1, total: 3 };
        assert!(progress.is_done());
        assert_eq!(progress.settled(), 3);
    }

    #[test]
    fn test_queued_can_fail_directly() {
        // Pre-flight budget rejection fails the job before it runs.
        let mut job = Job::new(Uuid::new_v4(), vec![]);
        job.transition_to(JobStatus::Failed).unwrap();
        assert!(job.status.is_terminal());
    }
}
