use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_workers: {0}. Must be between 1 and 64")]
    InvalidMaxWorkers(usize),

    #[error("Invalid submission_timeout_secs: {0}. Must be positive")]
    InvalidTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid budget cap: {0}. Must be positive")]
    InvalidBudgetCap(f64),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid verification_alert_threshold: {0}. Must be within [0, 1]")]
    InvalidAlertThreshold(f64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. gavel.yaml in the working directory
    /// 3. Environment variables (GAVEL_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("gavel.yaml"))
            .merge(Env::prefixed("GAVEL_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_workers == 0 || config.max_workers > 64 {
            return Err(ConfigError::InvalidMaxWorkers(config.max_workers));
        }

        if config.submission_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(config.submission_timeout_secs));
        }

        if !(0.0..=1.0).contains(&config.verification_alert_threshold) {
            return Err(ConfigError::InvalidAlertThreshold(
                config.verification_alert_threshold,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.budget.cap_usd <= 0.0 {
            return Err(ConfigError::InvalidBudgetCap(config.budget.cap_usd));
        }

        if config.budget.max_invocation_cost_usd <= 0.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "max_invocation_cost_usd must be positive, got {}",
                config.budget.max_invocation_cost_usd
            )));
        }

        if config.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        // Rubric weights must sum to 1.0; each scorer must map to a dimension.
        config
            .rubric()
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        config
            .bands
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        for scorer in config.enabled_scorers() {
            if scorer.name.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "Scorer name cannot be empty".to_string(),
                ));
            }
            if !config.rubric.iter().any(|d| d.name == scorer.dimension) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Scorer '{}' targets dimension '{}' which is not in the rubric",
                    scorer.name, scorer.dimension
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RubricDimension;
    use std::env;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.logging.level, "info");
        assert!((config.budget.cap_usd - 10.0).abs() < f64::EPSILON);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let yaml = r"
max_workers: 8
budget:
  cap_usd: 25.0
logging:
  level: debug
";
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .unwrap();

        assert_eq!(config.max_workers, 8);
        assert!((config.budget.cap_usd - 25.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty", "untouched fields keep defaults");
        ConfigLoader::validate(&config).expect("Merged config should be valid");
    }

    #[test]
    fn test_validate_zero_workers() {
        let config = Config { max_workers: 0, ..Default::default() };
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxWorkers(0)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_nonpositive_budget_cap() {
        let mut config = Config::default();
        config.budget.cap_usd = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBudgetCap(_)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 30_000;
        config.retry.max_backoff_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_rubric_weights_must_sum_to_one() {
        let mut config = Config::default();
        config.rubric = vec![
            RubricDimension { name: "code_quality".to_string(), weight: 0.5 },
            RubricDimension { name: "security".to_string(), weight: 0.3 },
        ];
        // Scorers for originality/completeness now target missing dimensions,
        // but the weight-sum check fires first.
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ValidationFailed(_)
        ));
    }

    #[test]
    fn test_validate_scorer_must_map_to_rubric_dimension() {
        let mut config = Config::default();
        config.scorers[0].dimension = "vibes".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::ValidationFailed(msg) => assert!(msg.contains("vibes")),
            other => panic!("Expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_env_override() {
        env::set_var("GAVEL_TEST_MAX_WORKERS", "8");
        assert_eq!(env::var("GAVEL_TEST_MAX_WORKERS").unwrap(), "8");
        env::remove_var("GAVEL_TEST_MAX_WORKERS");
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_workers: 2\nsubmission_timeout_secs: 120").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.submission_timeout_secs, 120);
    }
}
