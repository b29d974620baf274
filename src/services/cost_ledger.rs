//! Append-only cost ledger.
//!
//! Records one [`CostRecord`] per scorer invocation and computes totals at
//! read time from the full record set. Records may arrive out of order
//! across concurrent scorers; totals are always consistent because nothing
//! is ever mutated or deleted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::models::{CostRecord, CostScope};

/// Running average of observed per-invocation cost for one scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScorerCostStats {
    pub invocations: u64,
    pub total_usd: f64,
}

impl ScorerCostStats {
    #[allow(clippy::cast_precision_loss)]
    pub fn average_usd(&self) -> Option<f64> {
        (self.invocations > 0).then(|| self.total_usd / self.invocations as f64)
    }
}

/// Shared, append-only ledger of scorer invocation costs.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    records: Arc<RwLock<Vec<CostRecord>>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record. Records are immutable once written.
    pub async fn record(&self, record: CostRecord) {
        debug!(
            scorer = %record.scorer,
            model = %record.model,
            cost_usd = record.cost_usd,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            "Recorded scorer invocation cost"
        );
        let mut records = self.records.write().await;
        records.push(record);
    }

    /// Sum of costs within a scope, computed from the full record set.
    pub async fn total(&self, scope: CostScope) -> f64 {
        let records = self.records.read().await;
        records.iter().filter(|r| r.in_scope(scope)).map(|r| r.cost_usd).sum()
    }

    /// Number of records within a scope.
    pub async fn count(&self, scope: CostScope) -> usize {
        let records = self.records.read().await;
        records.iter().filter(|r| r.in_scope(scope)).count()
    }

    /// Historical per-scorer cost statistics, for pre-flight estimation.
    pub async fn scorer_stats(&self) -> HashMap<String, ScorerCostStats> {
        let records = self.records.read().await;
        let mut stats: HashMap<String, ScorerCostStats> = HashMap::new();
        for r in records.iter() {
            let entry = stats.entry(r.scorer.clone()).or_default();
            entry.invocations += 1;
            entry.total_usd += r.cost_usd;
        }
        stats
    }

    /// All records in a scope, cloned for audit inspection.
    pub async fn records_in_scope(&self, scope: CostScope) -> Vec<CostRecord> {
        let records = self.records.read().await;
        records.iter().filter(|r| r.in_scope(scope)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(parent: Uuid, job: Uuid, scorer: &str, cost: f64) -> CostRecord {
        CostRecord::new(parent, job, Uuid::new_v4(), scorer, "sonnet", 1000, 500, cost)
    }

    #[tokio::test]
    async fn test_totals_by_scope() {
        let ledger = CostLedger::new();
        let parent = Uuid::new_v4();
        let job_a = Uuid::new_v4();
        let job_b = Uuid::new_v4();

        ledger.record(record(parent, job_a, "security", 0.10)).await;
        ledger.record(record(parent, job_a, "quality", 0.20)).await;
        ledger.record(record(parent, job_b, "security", 0.40)).await;

        assert!((ledger.total(CostScope::Job(job_a)).await - 0.30).abs() < 1e-9);
        assert!((ledger.total(CostScope::Job(job_b)).await - 0.40).abs() < 1e-9);
        assert!((ledger.total(CostScope::Parent(parent)).await - 0.70).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_scope_totals_zero() {
        let ledger = CostLedger::new();
        assert!(ledger.total(CostScope::Parent(Uuid::new_v4())).await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_scorer_stats_average() {
        let ledger = CostLedger::new();
        let parent = Uuid::new_v4();
        let job = Uuid::new_v4();
        ledger.record(record(parent, job, "security", 0.10)).await;
        ledger.record(record(parent, job, "security", 0.30)).await;

        let stats = ledger.scorer_stats().await;
        let security = stats.get("security").unwrap();
        assert_eq!(security.invocations, 2);
        assert!((security.average_usd().unwrap() - 0.20).abs() < 1e-9);
        assert!(stats.get("quality").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land() {
        let ledger = CostLedger::new();
        let parent = Uuid::new_v4();
        let job = Uuid::new_v4();

        let mut handles = vec![];
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record(record(parent, job, "security", 0.01)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(ledger.count(CostScope::Job(job)).await, 16);
        assert!((ledger.total(CostScope::Job(job)).await - 0.16).abs() < 1e-9);
    }
}
