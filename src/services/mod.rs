//! Application services: the orchestration pipeline and its supporting
//! pure logic (aggregation, evidence validation, pricing) and shared state
//! (cost ledger, budget guard).

pub mod budget_guard;
pub mod cost_ledger;
pub mod evidence_validator;
pub mod job_coordinator;
pub mod pricing;
pub mod score_aggregator;

pub use budget_guard::{BudgetDecision, BudgetGuard, CostRange};
pub use cost_ledger::{CostLedger, ScorerCostStats};
pub use job_coordinator::{JobCoordinator, JobStatusView, JobTicket, SubmissionResultView};
