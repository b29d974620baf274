//! Runtime configuration models.
//!
//! Loaded hierarchically by `infrastructure::config::ConfigLoader`
//! (defaults, then yaml file, then `GAVEL_`-prefixed environment variables).

use serde::{Deserialize, Serialize};

use crate::domain::models::score::{Rubric, RubricDimension, ScoreBands};

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bounded worker pool size for concurrent submission processing.
    pub max_workers: usize,
    /// Global per-submission analysis timeout in seconds. On expiry,
    /// still-pending scorers are cancelled; completed results are kept.
    pub submission_timeout_secs: u64,
    /// Verification rate below which a critical alert is emitted.
    pub verification_alert_threshold: f64,
    pub budget: BudgetConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub scorers: Vec<ScorerConfig>,
    pub rubric: Vec<RubricDimension>,
    pub bands: ScoreBands,
}

/// Budget enforcement settings for a parent entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Hard spending cap in USD per parent entity.
    pub cap_usd: f64,
    /// Fallback per-invocation cost estimate (USD) used before any
    /// historical averages exist.
    pub default_invocation_cost_usd: f64,
    /// Worst-case cost of a single scorer invocation (USD). Running
    /// reservations are sized at this amount and settled down to the actual
    /// cost once the invocation has been priced, so the counter never
    /// under-reserves ahead of an expensive reply.
    pub max_invocation_cost_usd: f64,
    /// Spread applied around the point estimate to produce a range.
    pub estimate_spread: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            cap_usd: 10.0,
            default_invocation_cost_usd: 0.05,
            max_invocation_cost_usd: 0.50,
            estimate_spread: 0.5,
        }
    }
}

/// Backend-layer retry settings for transient scorer backend errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff_ms: 1_000, max_backoff_ms: 30_000 }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error.
    pub level: String,
    /// One of: json, pretty.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Configuration for one scorer variant in the closed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Scorer name, e.g. "security".
    pub name: String,
    /// Rubric dimension this scorer contributes to.
    pub dimension: String,
    /// Model identifier passed to the backend.
    pub model: String,
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 4,
            submission_timeout_secs: 600,
            verification_alert_threshold: 0.95,
            budget: BudgetConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            scorers: vec![
                ScorerConfig {
                    name: "code_quality".to_string(),
                    dimension: "code_quality".to_string(),
                    model: "sonnet".to_string(),
                    enabled: true,
                },
                ScorerConfig {
                    name: "security".to_string(),
                    dimension: "security".to_string(),
                    model: "sonnet".to_string(),
                    enabled: true,
                },
                ScorerConfig {
                    name: "originality".to_string(),
                    dimension: "originality".to_string(),
                    model: "haiku".to_string(),
                    enabled: true,
                },
                ScorerConfig {
                    name: "completeness".to_string(),
                    dimension: "completeness".to_string(),
                    model: "haiku".to_string(),
                    enabled: true,
                },
            ],
            rubric: vec![
                RubricDimension { name: "code_quality".to_string(), weight: 0.35 },
                RubricDimension { name: "security".to_string(), weight: 0.25 },
                RubricDimension { name: "originality".to_string(), weight: 0.2 },
                RubricDimension { name: "completeness".to_string(), weight: 0.2 },
            ],
            bands: ScoreBands::default(),
        }
    }
}

impl Config {
    /// The rubric as a validated domain object.
    pub fn rubric(&self) -> Rubric {
        Rubric { dimensions: self.rubric.clone() }
    }

    /// Names of scorers enabled for job setup.
    pub fn enabled_scorers(&self) -> Vec<&ScorerConfig> {
        self.scorers.iter().filter(|s| s.enabled).collect()
    }
}
