//! Scoring domain models: scorer output, evidence citations, rubric
//! configuration, and the final aggregated scorecard.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainResult, OrchestratorError};

/// Lower bound of a scorer's raw score range.
pub const RAW_SCORE_MIN: f64 = 0.0;
/// Upper bound of a scorer's raw score range.
pub const RAW_SCORE_MAX: f64 = 10.0;
/// Scale factor mapping a weight-summed raw score to the overall range.
pub const OVERALL_SCALE: f64 = 10.0;
/// Tolerance used when validating that rubric weights sum to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Severity attached to an evidence citation by the scorer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Default for EvidenceSeverity {
    fn default() -> Self {
        Self::Info
    }
}

/// A citation supporting a scorer's finding: a file, line, and/or commit
/// reference into the repository snapshot.
///
/// Created by a scorer with `verified == false`; the evidence validator sets
/// `verified`/`error` exactly once. Unverified evidence is excluded from
/// user-facing output but retained for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Name of the scorer that produced this citation.
    pub scorer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default)]
    pub severity: EvidenceSeverity,
    /// Free-text description of the finding.
    pub description: String,
    #[serde(default)]
    pub verified: bool,
    /// Reason the citation failed verification, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Evidence {
    pub fn new(scorer: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            scorer: scorer.into(),
            file_path: None,
            line: None,
            commit: None,
            severity: EvidenceSeverity::default(),
            description: description.into(),
            verified: false,
            error: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn with_severity(mut self, severity: EvidenceSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// One scorer's output for one submission. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Name of the scorer that produced this result.
    pub scorer: String,
    /// Rubric dimension this result scores.
    pub dimension: String,
    /// Raw score, clamped by the adapter into `[RAW_SCORE_MIN, RAW_SCORE_MAX]`.
    pub raw_score: f64,
    /// Scorer's self-reported confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

/// One weighted dimension of a judging rubric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RubricDimension {
    pub name: String,
    /// Weight share in `[0.0, 1.0]`; all weights sum to 1.0.
    pub weight: f64,
}

/// The weighted set of scoring dimensions for a job.
///
/// Weight-sum validation happens here, at configuration time, never at
/// aggregation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rubric {
    pub dimensions: Vec<RubricDimension>,
}

impl Rubric {
    /// Build a rubric from `(name, weight)` pairs, validating the weight sum.
    pub fn new(dimensions: Vec<(&str, f64)>) -> DomainResult<Self> {
        let rubric = Self {
            dimensions: dimensions
                .into_iter()
                .map(|(name, weight)| RubricDimension { name: name.to_string(), weight })
                .collect(),
        };
        rubric.validate()?;
        Ok(rubric)
    }

    /// Validate that weights are non-negative and sum to 1.0 within tolerance.
    pub fn validate(&self) -> DomainResult<()> {
        if self.dimensions.is_empty() {
            return Err(OrchestratorError::InvalidRubric("rubric has no dimensions".to_string()));
        }
        if let Some(dim) = self.dimensions.iter().find(|d| d.weight < 0.0 || !d.weight.is_finite()) {
            return Err(OrchestratorError::InvalidRubric(format!(
                "dimension '{}' has invalid weight {}",
                dim.name, dim.weight
            )));
        }
        let sum: f64 = self.dimensions.iter().map(|d| d.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(OrchestratorError::InvalidRubric(format!(
                "dimension weights sum to {sum}, expected 1.0"
            )));
        }
        Ok(())
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name.as_str()).collect()
    }
}

/// Categorical recommendation derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Strong,
    Solid,
    NeedsImprovement,
    ConcernsFlagged,
}

/// Score band boundaries mapping an overall score to a [`Recommendation`].
///
/// Boundaries are deployment configuration, not hardcoded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBands {
    pub strong_min: f64,
    pub solid_min: f64,
    pub needs_improvement_min: f64,
}

impl Default for ScoreBands {
    fn default() -> Self {
        Self { strong_min: 80.0, solid_min: 65.0, needs_improvement_min: 45.0 }
    }
}

impl ScoreBands {
    pub fn validate(&self) -> DomainResult<()> {
        if !(self.needs_improvement_min <= self.solid_min && self.solid_min <= self.strong_min) {
            return Err(OrchestratorError::InvalidRubric(format!(
                "score bands must be ordered: {} <= {} <= {}",
                self.needs_improvement_min, self.solid_min, self.strong_min
            )));
        }
        Ok(())
    }

    pub fn recommend(&self, overall: f64) -> Recommendation {
        if overall >= self.strong_min {
            Recommendation::Strong
        } else if overall >= self.solid_min {
            Recommendation::Solid
        } else if overall >= self.needs_improvement_min {
            Recommendation::NeedsImprovement
        } else {
            Recommendation::ConcernsFlagged
        }
    }
}

/// Per-dimension contribution to the aggregated score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionScore {
    pub dimension: String,
    /// Raw scorer output for this dimension; 0.0 when the scorer failed.
    pub raw: f64,
    /// Weighted contribution on the overall scale.
    pub weighted: f64,
    pub weight: f64,
    /// False when the contributing scorer failed or was skipped.
    pub scored: bool,
}

/// The final submission-level result. Computed once all scorers have settled;
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedScore {
    /// Weighted sum scaled to `[0.0, 100.0]`.
    pub overall: f64,
    /// Minimum confidence across contributing results.
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub dimension_scores: Vec<DimensionScore>,
    /// Verified evidence only; unverified citations stay on the raw results.
    pub evidence: Vec<Evidence>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    /// verified / total across all evidence for the submission.
    pub verification_rate: f64,
}
