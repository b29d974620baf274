//! Model-aware cost computation with per-model pricing.
//!
//! Cost is strictly increasing in both token counts for a fixed model, which
//! is what makes the ledger's running totals trustworthy.

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Cost per million input tokens (USD).
    pub input: f64,
    /// Cost per million output tokens (USD).
    pub output: f64,
}

/// Known model pricing table (costs in USD per million tokens).
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("opus", ModelPricing { input: 15.0, output: 75.0 }),
    ("sonnet", ModelPricing { input: 3.0, output: 15.0 }),
    ("haiku", ModelPricing { input: 0.80, output: 4.0 }),
];

/// Fallback pricing for models missing from the table. Priced like a
/// mid-tier model so unknown models still accrue cost instead of judging
/// for free.
const DEFAULT_PRICING: ModelPricing = ModelPricing { input: 3.0, output: 15.0 };

/// Get pricing for a model by name or alias.
///
/// Matches against known model name substrings (e.g. "sonnet" matches
/// "claude-sonnet-4-5-20250929").
pub fn model_pricing(model: &str) -> ModelPricing {
    let model_lower = model.to_lowercase();
    PRICING_TABLE
        .iter()
        .find(|(name, _)| model_lower.contains(name))
        .map_or(DEFAULT_PRICING, |(_, pricing)| *pricing)
}

/// Compute the cost in USD for one invocation's token counts.
#[allow(clippy::cast_precision_loss)]
pub fn compute_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let pricing = model_pricing(model);
    (input_tokens as f64 * pricing.input + output_tokens as f64 * pricing.output) / 1_000_000.0
}
