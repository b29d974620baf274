//! Budget enforcement: pre-flight estimation and atomic running reservations.
//!
//! The running check is the one piece of mutable shared state in the system.
//! It goes through the store's conditional-update primitive — increment the
//! parent's budget counter only if the post-increment total stays at or under
//! the cap — so concurrent submissions in the same job can never overspend,
//! and the counter is never read-then-written.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BudgetConfig, ScorerConfig};
use crate::domain::ports::{ConditionalOutcome, KeyValueStore};
use crate::services::cost_ledger::CostLedger;

/// Pre-flight cost estimate as a low/high range around the point estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRange {
    pub low_usd: f64,
    pub high_usd: f64,
}

/// Outcome of a running budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    Allowed,
    /// The reservation would exceed the cap. The caller skips the scorer
    /// invocation; this is a budget-skip, not an error.
    Denied,
}

/// Store key holding the reserved-spend counter for a parent entity.
fn budget_key(parent_id: Uuid) -> String {
    format!("budget:{parent_id}")
}

/// Pre-flight and running budget checks against the shared budget counter.
pub struct BudgetGuard {
    store: Arc<dyn KeyValueStore>,
    ledger: CostLedger,
    config: BudgetConfig,
}

impl BudgetGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, ledger: CostLedger, config: BudgetConfig) -> Self {
        Self { store, ledger, config }
    }

    pub fn cap_usd(&self) -> f64 {
        self.config.cap_usd
    }

    /// Estimate the cost of analyzing `submission_count` submissions with the
    /// given scorers, using historical per-scorer averages where available
    /// and the configured fallback otherwise.
    #[allow(clippy::cast_precision_loss)]
    pub async fn estimated_cost(
        &self,
        submission_count: usize,
        enabled_scorers: &[&ScorerConfig],
    ) -> CostRange {
        let stats = self.ledger.scorer_stats().await;
        let per_submission: f64 = enabled_scorers
            .iter()
            .map(|s| {
                stats
                    .get(&s.name)
                    .and_then(super::cost_ledger::ScorerCostStats::average_usd)
                    .unwrap_or(self.config.default_invocation_cost_usd)
            })
            .sum();
        let point = per_submission * submission_count as f64;
        CostRange {
            low_usd: point * (1.0 - self.config.estimate_spread).max(0.0),
            high_usd: point * (1.0 + self.config.estimate_spread),
        }
    }

    /// Worst-case amount reserved ahead of one invocation. Reservations are
    /// sized pessimistically and reconciled with the actual cost by
    /// [`settle`](Self::settle) once the invocation has been costed.
    pub fn reservation_usd(&self) -> f64 {
        self.config.max_invocation_cost_usd
    }

    /// Atomically reserve `incremental_usd` against the parent's budget
    /// counter. Allowed only if the post-increment total would not exceed
    /// the cap.
    pub async fn check_and_reserve(
        &self,
        parent_id: Uuid,
        incremental_usd: f64,
    ) -> DomainResult<BudgetDecision> {
        let cap = self.config.cap_usd;
        let outcome = self
            .store
            .conditional_update(
                &budget_key(parent_id),
                Box::new(move |current: Option<&Value>| {
                    let spent = current.and_then(Value::as_f64).unwrap_or(0.0);
                    json!(spent + incremental_usd)
                }),
                Box::new(move |current: Option<&Value>| {
                    let spent = current.and_then(Value::as_f64).unwrap_or(0.0);
                    spent + incremental_usd <= cap
                }),
            )
            .await?;

        match outcome {
            ConditionalOutcome::Applied => {
                debug!(%parent_id, incremental_usd, "Budget reservation allowed");
                Ok(BudgetDecision::Allowed)
            }
            ConditionalOutcome::ConditionFailed => {
                info!(%parent_id, incremental_usd, cap, "Budget reservation denied; skipping scorer");
                Ok(BudgetDecision::Denied)
            }
        }
    }

    /// Reconcile a reservation with the invocation's actual cost, adjusting
    /// the counter by `actual_usd - reserved_usd`. Applied unconditionally so
    /// the counter always tracks real spend: an under-run frees headroom for
    /// later reservations, and an overrun pushes the counter past the cap and
    /// blocks further reservations instead of hiding the overspend.
    pub async fn settle(
        &self,
        parent_id: Uuid,
        reserved_usd: f64,
        actual_usd: f64,
    ) -> DomainResult<()> {
        let delta = actual_usd - reserved_usd;
        self.store
            .conditional_update(
                &budget_key(parent_id),
                Box::new(move |current: Option<&Value>| {
                    let spent = current.and_then(Value::as_f64).unwrap_or(0.0);
                    json!((spent + delta).max(0.0))
                }),
                Box::new(|_| true),
            )
            .await?;
        debug!(%parent_id, reserved_usd, actual_usd, "Budget reservation settled");
        Ok(())
    }

    /// Current reserved spend for a parent entity.
    pub async fn reserved(&self, parent_id: Uuid) -> DomainResult<f64> {
        let value = self.store.get(&budget_key(parent_id)).await?;
        Ok(value.and_then(|v| v.as_f64()).unwrap_or(0.0))
    }
}
