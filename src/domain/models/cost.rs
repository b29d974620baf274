//! Cost accounting records for scorer invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scorer invocation's accounting entry. Append-only; never mutated or
/// deleted after being written to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub job_id: Uuid,
    pub submission_id: Uuid,
    pub scorer: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Computed monetary cost in USD.
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Identifies which total the ledger should sum over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostScope {
    Submission(Uuid),
    Job(Uuid),
    Parent(Uuid),
}

impl CostRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_id: Uuid,
        job_id: Uuid,
        submission_id: Uuid,
        scorer: impl Into<String>,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            job_id,
            submission_id,
            scorer: scorer.into(),
            model: model.into(),
            input_tokens,
            output_tokens,
            cost_usd,
            recorded_at: Utc::now(),
        }
    }

    /// Whether this record falls inside the given scope.
    pub fn in_scope(&self, scope: CostScope) -> bool {
        match scope {
            CostScope::Submission(id) => self.submission_id == id,
            CostScope::Job(id) => self.job_id == id,
            CostScope::Parent(id) => self.parent_id == id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_matching() {
        let parent = Uuid::new_v4();
        let job = Uuid::new_v4();
        let submission = Uuid::new_v4();
        let record = CostRecord::new(parent, job, submission, "security", "sonnet", 100, 50, 0.01);

        assert!(record.in_scope(CostScope::Parent(parent)));
        assert!(record.in_scope(CostScope::Job(job)));
        assert!(record.in_scope(CostScope::Submission(submission)));
        assert!(!record.in_scope(CostScope::Job(Uuid::new_v4())));
    }
}
