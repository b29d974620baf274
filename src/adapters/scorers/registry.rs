//! Scorer registry: builds the closed set of scorer variants from
//! configuration.
//!
//! Selection happens once at job setup; there is no runtime type inspection
//! and no plugin loading.

use std::sync::Arc;

use crate::domain::models::{RetryConfig, ScorerConfig};
use crate::domain::ports::{Scorer, ScorerBackend};
use crate::infrastructure::retry::RetryPolicy;

use super::prompt::PromptScorer;

/// Instantiate one [`PromptScorer`] per enabled scorer config entry.
pub fn build_scorers(
    configs: &[ScorerConfig],
    backend: Arc<dyn ScorerBackend>,
    retry: &RetryConfig,
) -> Vec<Arc<dyn Scorer>> {
    configs
        .iter()
        .filter(|c| c.enabled)
        .map(|c| {
            Arc::new(PromptScorer::new(
                c.name.clone(),
                c.dimension.clone(),
                c.model.clone(),
                Arc::clone(&backend),
                RetryPolicy::from_config(retry),
            )) as Arc<dyn Scorer>
        })
        .collect()
}
