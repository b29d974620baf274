pub mod config;
pub mod cost;
pub mod job;
pub mod score;
pub mod snapshot;
pub mod submission;

pub use config::{BudgetConfig, Config, LoggingConfig, RetryConfig, ScorerConfig};
pub use cost::{CostRecord, CostScope};
pub use job::{Job, JobProgress, JobStatus};
pub use score::{
    AggregatedScore, DimensionScore, Evidence, EvidenceSeverity, Recommendation, Rubric,
    RubricDimension, ScoreBands, ScoreResult,
};
pub use snapshot::{RepoSnapshot, SnapshotFile};
pub use submission::{FailureReason, Submission, SubmissionStatus};
