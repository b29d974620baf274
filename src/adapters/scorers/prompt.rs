//! Prompt-template scorer adapter.
//!
//! Wraps one scoring backend behind the uniform [`Scorer`] contract: a fixed
//! system prompt and model per variant. Malformed output gets exactly one
//! corrective re-request; the progression is an explicit two-step state
//! (first attempt, then corrective), never a loop.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::score::{RAW_SCORE_MAX, RAW_SCORE_MIN};
use crate::domain::models::{Evidence, EvidenceSeverity, RepoSnapshot, ScoreResult};
use crate::domain::ports::{
    BackendResponse, EvaluationContext, Scorer, ScorerBackend, ScorerEvaluation,
};
use crate::infrastructure::retry::RetryPolicy;

/// JSON schema description embedded in prompts, including the corrective
/// re-request.
const RESPONSE_SCHEMA: &str = r#"{
  "raw_score": <number 0-10>,
  "confidence": <number 0-1>,
  "evidence": [{"file_path": <string|null>, "line": <integer|null>, "commit": <string|null>, "severity": "info|low|medium|high|critical", "description": <string>}],
  "strengths": [<string>],
  "improvements": [<string>]
}"#;

/// Wire shape of one evidence item in a scorer reply.
#[derive(Debug, Deserialize)]
struct EvidencePayload {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    commit: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    description: String,
}

/// Wire shape of a full scorer reply.
#[derive(Debug, Deserialize)]
struct ScorePayload {
    raw_score: f64,
    confidence: f64,
    #[serde(default)]
    evidence: Vec<EvidencePayload>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

fn parse_severity(s: Option<&str>) -> EvidenceSeverity {
    match s.map(str::to_lowercase).as_deref() {
        Some("low") => EvidenceSeverity::Low,
        Some("medium") => EvidenceSeverity::Medium,
        Some("high") => EvidenceSeverity::High,
        Some("critical") => EvidenceSeverity::Critical,
        _ => EvidenceSeverity::Info,
    }
}

/// Strip a surrounding markdown code fence. Backends wrap JSON in fences
/// even when told not to.
fn strip_code_fences(output: &str) -> &str {
    let trimmed = output.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() > 6 {
        let start = trimmed.find('\n').map_or(3, |pos| pos + 1);
        let end = trimmed.rfind("\n```").unwrap_or(trimmed.len() - 3);
        if start <= end {
            return trimmed[start..end].trim();
        }
    }
    trimmed
}

/// One configured scorer variant: fixed prompt, fixed model, one dimension.
pub struct PromptScorer {
    name: String,
    dimension: String,
    model: String,
    system_prompt: String,
    backend: Arc<dyn ScorerBackend>,
    retry: RetryPolicy,
}

impl PromptScorer {
    pub fn new(
        name: impl Into<String>,
        dimension: impl Into<String>,
        model: impl Into<String>,
        backend: Arc<dyn ScorerBackend>,
        retry: RetryPolicy,
    ) -> Self {
        let name = name.into();
        let dimension = dimension.into();
        let system_prompt = format!(
            "You are the {name} scorer judging a hackathon submission on the \
             '{dimension}' dimension. Score 0-10 and cite concrete evidence \
             (file, line, commit) for every finding. Respond with JSON only, \
             matching this schema:\n{RESPONSE_SCHEMA}"
        );
        Self { name, dimension, model: model.into(), system_prompt, backend, retry }
    }

    fn build_context(ctx: &EvaluationContext, snapshot: &RepoSnapshot) -> String {
        let file_list = snapshot
            .files
            .iter()
            .map(|f| format!("{} ({} lines)", f.path, f.line_count))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Team: {}\n\n## Files\n{}\n\n## README\n{}\n\n## Source excerpts\n{}",
            ctx.team_name, file_list, snapshot.readme, snapshot.source_excerpts
        )
    }

    /// Invoke the backend once, with transient-error retry underneath.
    async fn invoke(&self, prompt: &str, context: &str) -> DomainResult<BackendResponse> {
        self.retry
            .execute(|| self.backend.invoke(prompt, context, &self.model))
            .await
            .map_err(|err| match err {
                OrchestratorError::ScorerBackend { message, .. } => {
                    OrchestratorError::ScorerBackend { scorer: self.name.clone(), message }
                }
                other => other,
            })
    }

    fn parse(&self, text: &str) -> Result<ScorePayload, String> {
        serde_json::from_str::<ScorePayload>(strip_code_fences(text)).map_err(|e| e.to_string())
    }

    fn build_result(&self, payload: ScorePayload) -> ScoreResult {
        let evidence = payload
            .evidence
            .into_iter()
            .map(|e| Evidence {
                scorer: self.name.clone(),
                file_path: e.file_path,
                line: e.line,
                commit: e.commit,
                severity: parse_severity(e.severity.as_deref()),
                description: e.description,
                verified: false,
                error: None,
            })
            .collect();

        ScoreResult {
            scorer: self.name.clone(),
            dimension: self.dimension.clone(),
            raw_score: payload.raw_score.clamp(RAW_SCORE_MIN, RAW_SCORE_MAX),
            confidence: payload.confidence.clamp(0.0, 1.0),
            evidence,
            strengths: payload.strengths,
            improvements: payload.improvements,
        }
    }
}

#[async_trait]
impl Scorer for PromptScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> &str {
        &self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn evaluate(
        &self,
        ctx: &EvaluationContext,
        snapshot: &RepoSnapshot,
    ) -> DomainResult<ScorerEvaluation> {
        let context = Self::build_context(ctx, snapshot);

        // First attempt.
        let first = self.invoke(&self.system_prompt, &context).await?;
        let mut input_tokens = first.input_tokens;
        let mut output_tokens = first.output_tokens;

        let first_error = match self.parse(&first.text) {
            Ok(payload) => {
                debug!(scorer = %self.name, submission_id = %ctx.submission_id, "Scorer reply parsed on first attempt");
                return Ok(ScorerEvaluation {
                    score: self.build_result(payload),
                    input_tokens,
                    output_tokens,
                });
            }
            Err(e) => e,
        };

        // Corrective re-request: one chance to fix the output, then terminal.
        warn!(
            scorer = %self.name,
            submission_id = %ctx.submission_id,
            error = %first_error,
            "Malformed scorer reply; issuing corrective re-request"
        );
        let corrective_prompt = format!(
            "{}\n\nYour previous response was not valid JSON matching the \
             schema ({first_error}). Return ONLY valid JSON matching this \
             schema:\n{RESPONSE_SCHEMA}",
            self.system_prompt
        );
        let second = self.invoke(&corrective_prompt, &context).await?;
        input_tokens += second.input_tokens;
        output_tokens += second.output_tokens;

        match self.parse(&second.text) {
            Ok(payload) => Ok(ScorerEvaluation {
                score: self.build_result(payload),
                input_tokens,
                output_tokens,
            }),
            Err(second_error) => Err(OrchestratorError::ScorerParse {
                scorer: self.name.clone(),
                message: second_error,
            }),
        }
    }
}
