//! Job triggering semantics: single-flight per parent entity, pre-flight
//! budget rejection, running budget gating, and cooperative cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{sample_snapshot, wait_for_job, MockSnapshotProvider};
use gavel::{
    build_scorers, Config, JobCoordinator, JobStatus, KeyValueStore, MockBackend, MockReply,
    OrchestratorError, ScorerBackend, SnapshotProvider, Submission, SubmissionResultView,
};
use uuid::Uuid;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.max_workers = 2;
    config.submission_timeout_secs = 10;
    config.retry.max_retries = 1;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    config
}

fn build(
    config: Config,
    backend: &Arc<MockBackend>,
    provider: Arc<MockSnapshotProvider>,
) -> Arc<JobCoordinator> {
    let backend_port: Arc<dyn ScorerBackend> = backend.clone();
    let provider_port: Arc<dyn SnapshotProvider> = provider;
    let scorers = build_scorers(&config.scorers, backend_port, &config.retry);
    Arc::new(
        JobCoordinator::new(config, scorers, provider_port, Arc::new(gavel::MemoryStore::new()))
            .expect("valid config"),
    )
}

async fn script_all_valid(backend: &MockBackend, copies: usize) {
    for name in ["code_quality", "security", "originality", "completeness"] {
        backend
            .script(name, vec![MockReply::valid_score(7.0, 0.8); copies])
            .await;
    }
}

/// A well-formed scorer reply with explicit token counts, for tests that pin
/// the priced cost of an invocation.
fn priced_reply(raw_score: f64, input_tokens: u64, output_tokens: u64) -> MockReply {
    MockReply::text_with_tokens(
        format!(
            r#"{{"raw_score": {raw_score}, "confidence": 0.8, "evidence": [], "strengths": ["clean layout"], "improvements": ["add tests"]}}"#
        ),
        input_tokens,
        output_tokens,
    )
}

#[tokio::test]
async fn test_concurrent_triggers_have_a_single_winner() {
    let backend = Arc::new(MockBackend::new());
    // A slow snapshot keeps the winning job running while the others race.
    let provider = Arc::new(MockSnapshotProvider::with_delay(Duration::from_millis(300)));
    provider.put("repo-a", sample_snapshot()).await;
    script_all_valid(&backend, 10).await;

    let coordinator = build(fast_config(), &backend, provider);
    let parent = Uuid::new_v4();
    coordinator.register_submission(Submission::new(parent, "repo-a", "team-a")).await.unwrap();

    let mut handles = vec![];
    for _ in 0..5 {
        let coordinator = Arc::clone(&coordinator);
        handles.push(tokio::spawn(async move { coordinator.trigger_job(parent, None).await }));
    }

    let mut winners = vec![];
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(ticket) => winners.push(ticket),
            Err(OrchestratorError::JobConflict(id)) => {
                assert_eq!(id, parent);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 4);

    // After the winner settles, the slot is free again.
    let view = wait_for_job(&coordinator, winners[0].job_id).await;
    assert_eq!(view.status, JobStatus::Completed);

    coordinator.register_submission(Submission::new(parent, "repo-a", "team-b")).await.unwrap();
    let second = coordinator.trigger_job(parent, None).await.unwrap();
    wait_for_job(&coordinator, second.job_id).await;
}

#[tokio::test]
async fn test_trigger_without_pending_submissions_is_rejected() {
    let backend = Arc::new(MockBackend::new());
    let coordinator = build(fast_config(), &backend, Arc::new(MockSnapshotProvider::new()));

    let err = coordinator.trigger_job(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NoSubmissions(_)));
}

#[tokio::test]
async fn test_trigger_with_unknown_submission_id_is_rejected() {
    let backend = Arc::new(MockBackend::new());
    let coordinator = build(fast_config(), &backend, Arc::new(MockSnapshotProvider::new()));

    let err = coordinator
        .trigger_job(Uuid::new_v4(), Some(vec![Uuid::new_v4()]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SubmissionNotFound(_)));
}

#[tokio::test]
async fn test_preflight_budget_rejection_releases_the_slot() {
    let mut config = fast_config();
    config.budget.cap_usd = 0.01;

    let backend = Arc::new(MockBackend::new());
    let provider = Arc::new(MockSnapshotProvider::new());
    provider.put("repo-a", sample_snapshot()).await;
    let coordinator = build(config, &backend, provider);

    let parent = Uuid::new_v4();
    coordinator.register_submission(Submission::new(parent, "repo-a", "team-a")).await.unwrap();

    let err = coordinator.trigger_job(parent, None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::BudgetExceeded { .. }));

    // The slot was released on rejection: a retry hits the budget check
    // again, not a conflict.
    let err = coordinator.trigger_job(parent, None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::BudgetExceeded { .. }));
}

#[tokio::test]
async fn test_running_budget_gates_scorers_mid_submission() {
    // Cap fits only two $0.06 reservations; the other two scorers are
    // skipped, and the submission still completes with partial dimensions.
    // Every reply is priced at exactly the reserved amount, so settling a
    // reservation frees no headroom and the outcome is order-independent.
    let mut config = fast_config();
    config.budget.cap_usd = 0.12;
    config.budget.max_invocation_cost_usd = 0.06;

    let backend = Arc::new(MockBackend::new());
    let provider = Arc::new(MockSnapshotProvider::new());
    provider.put("repo-a", sample_snapshot()).await;
    // sonnet: (3 * 10k + 15 * 2k) / 1M = $0.06; haiku: (0.8 * 25k + 4 * 10k) / 1M = $0.06.
    for name in ["code_quality", "security"] {
        backend.script(name, vec![priced_reply(7.0, 10_000, 2_000)]).await;
    }
    for name in ["originality", "completeness"] {
        backend.script(name, vec![priced_reply(7.0, 25_000, 10_000)]).await;
    }
    let coordinator = build(config, &backend, provider);

    let parent = Uuid::new_v4();
    let submission = Submission::new(parent, "repo-a", "team-a");
    let submission_id = submission.id;
    coordinator.register_submission(submission).await.unwrap();

    let ticket = coordinator.trigger_job(parent, None).await.unwrap();
    let view = wait_for_job(&coordinator, ticket.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);

    match coordinator.get_submission_result(submission_id).await.unwrap() {
        SubmissionResultView::Completed(score) => {
            let scored = score.dimension_scores.iter().filter(|d| d.scored).count();
            assert_eq!(scored, 2, "exactly two scorers fit under the cap");
        }
        other => panic!("expected completed result, got {other:?}"),
    }
    assert_eq!(coordinator.ledger().count(gavel::CostScope::Job(ticket.job_id)).await, 2);
    // The counter ends at actual spend: two settled $0.06 invocations.
    let reserved = coordinator.budget().reserved(parent).await.unwrap();
    assert!((reserved - 0.12).abs() < 1e-9);
}

#[tokio::test]
async fn test_expensive_reply_trues_up_counter_and_blocks_further_work() {
    // A reply can come back orders of magnitude above its reservation. The
    // settled counter must track the real spend so the cap stops any further
    // reservations instead of drifting on stale estimates.
    let mut config = fast_config();
    config.budget.cap_usd = 1.0;
    config.budget.max_invocation_cost_usd = 0.05;

    let backend = Arc::new(MockBackend::new());
    let provider = Arc::new(MockSnapshotProvider::new());
    provider.put("repo-a", sample_snapshot()).await;
    // 10M output tokens on sonnet prices at $150, far past the $1 cap.
    backend.script("security", vec![priced_reply(7.0, 1_000, 10_000_000)]).await;
    for name in ["code_quality", "originality", "completeness"] {
        backend.script(name, vec![MockReply::valid_score(7.0, 0.8)]).await;
    }
    let coordinator = build(config, &backend, provider);

    let parent = Uuid::new_v4();
    coordinator.register_submission(Submission::new(parent, "repo-a", "team-a")).await.unwrap();
    let ticket = coordinator.trigger_job(parent, None).await.unwrap();
    let view = wait_for_job(&coordinator, ticket.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);

    let spent = coordinator.ledger().total(gavel::CostScope::Parent(parent)).await;
    let reserved = coordinator.budget().reserved(parent).await.unwrap();
    assert!(spent > 100.0, "the expensive reply was recorded at its real cost");
    assert!((reserved - spent).abs() < 1e-6, "counter tracks real spend, not estimates");

    // Further work for this parent is blocked by the blown budget.
    coordinator.register_submission(Submission::new(parent, "repo-a", "team-b")).await.unwrap();
    let err = coordinator.trigger_job(parent, None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::BudgetExceeded { .. }));
}

#[tokio::test]
async fn test_explicit_ids_skip_terminal_submissions_and_duplicates() {
    let backend = Arc::new(MockBackend::new());
    let provider = Arc::new(MockSnapshotProvider::new());
    provider.put("repo-a", sample_snapshot()).await;
    script_all_valid(&backend, 10).await;
    let coordinator = build(fast_config(), &backend, provider);

    let parent = Uuid::new_v4();
    let first = Submission::new(parent, "repo-a", "team-a");
    let first_id = first.id;
    coordinator.register_submission(first).await.unwrap();

    let ticket = coordinator.trigger_job(parent, Some(vec![first_id])).await.unwrap();
    let view = wait_for_job(&coordinator, ticket.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);

    // Re-triggering a completed submission finds nothing to analyze.
    let err = coordinator.trigger_job(parent, Some(vec![first_id])).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NoSubmissions(_)));

    // Duplicate and terminal ids are dropped; only the new submission runs,
    // exactly once, and the finished one keeps its result.
    let second = Submission::new(parent, "repo-a", "team-b");
    let second_id = second.id;
    coordinator.register_submission(second).await.unwrap();
    let ticket = coordinator
        .trigger_job(parent, Some(vec![second_id, second_id, first_id]))
        .await
        .unwrap();
    let view = wait_for_job(&coordinator, ticket.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.progress.total, 1);
    assert_eq!(view.progress.completed, 1);
    assert_eq!(view.progress.failed, 0);
    assert!(matches!(
        coordinator.get_submission_result(first_id).await.unwrap(),
        SubmissionResultView::Completed(_)
    ));
}

#[tokio::test]
async fn test_hung_snapshot_provider_is_bounded_by_the_timeout() {
    let mut config = fast_config();
    config.submission_timeout_secs = 1;

    let backend = Arc::new(MockBackend::new());
    let provider = Arc::new(MockSnapshotProvider::with_delay(Duration::from_secs(3)));
    provider.put("repo-a", sample_snapshot()).await;
    script_all_valid(&backend, 1).await;
    let coordinator = build(config, &backend, provider);

    let parent = Uuid::new_v4();
    let submission = Submission::new(parent, "repo-a", "team-a");
    let submission_id = submission.id;
    coordinator.register_submission(submission).await.unwrap();

    let ticket = coordinator.trigger_job(parent, None).await.unwrap();
    let view = wait_for_job(&coordinator, ticket.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    match coordinator.get_submission_result(submission_id).await.unwrap() {
        SubmissionResultView::Failed(reason) => {
            assert_eq!(reason.step, "snapshot");
            assert!(reason.scorer_errors[0].contains("timed out"));
        }
        other => panic!("expected failed submission, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancellation_preserves_partial_accounting() {
    let backend = Arc::new(MockBackend::new());
    let provider = Arc::new(MockSnapshotProvider::with_delay(Duration::from_millis(300)));
    provider.put("repo-a", sample_snapshot()).await;
    script_all_valid(&backend, 1).await;
    let coordinator = build(fast_config(), &backend, provider);

    let parent = Uuid::new_v4();
    let submission = Submission::new(parent, "repo-a", "team-a");
    let submission_id = submission.id;
    coordinator.register_submission(submission).await.unwrap();

    let ticket = coordinator.trigger_job(parent, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.cancel_job(ticket.job_id).await.unwrap();

    let view = wait_for_job(&coordinator, ticket.job_id).await;
    assert_eq!(view.status, JobStatus::Failed);
    match coordinator.get_submission_result(submission_id).await.unwrap() {
        SubmissionResultView::Failed(reason) => {
            assert_eq!(reason.step, "cancelled", "cancellation is its own failure reason");
        }
        other => panic!("expected failed submission, got {other:?}"),
    }
    // Nothing was invoked before cancellation, so nothing was charged; the
    // ledger survives the cancellation either way.
    assert!(view.cost_usd >= 0.0);
}

/// Store that accepts everything except persisting a completed job record,
/// mimicking a write failure at the very end of a run.
struct FinalPersistFailingStore {
    inner: gavel::MemoryStore,
}

#[async_trait::async_trait]
impl KeyValueStore for FinalPersistFailingStore {
    async fn get(&self, key: &str) -> gavel::domain::errors::DomainResult<Option<serde_json::Value>> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> gavel::domain::errors::DomainResult<()> {
        if key.starts_with("job:") && value.get("status") == Some(&serde_json::json!("completed")) {
            return Err(gavel::OrchestratorError::Store("write rejected".to_string()));
        }
        self.inner.put(key, value).await
    }

    async fn conditional_update(
        &self,
        key: &str,
        mutation: gavel::domain::ports::UpdateFn,
        predicate: gavel::domain::ports::PredicateFn,
    ) -> gavel::domain::errors::DomainResult<gavel::domain::ports::ConditionalOutcome> {
        self.inner.conditional_update(key, mutation, predicate).await
    }
}

#[tokio::test]
async fn test_slot_is_released_even_when_final_persist_fails() {
    let backend = Arc::new(MockBackend::new());
    let provider = Arc::new(MockSnapshotProvider::new());
    provider.put("repo-a", sample_snapshot()).await;
    script_all_valid(&backend, 10).await;

    let config = fast_config();
    let backend_port: Arc<dyn ScorerBackend> = backend.clone();
    let provider_port: Arc<dyn SnapshotProvider> = provider;
    let scorers = build_scorers(&config.scorers, backend_port, &config.retry);
    let store = Arc::new(FinalPersistFailingStore { inner: gavel::MemoryStore::new() });
    let coordinator =
        Arc::new(JobCoordinator::new(config, scorers, provider_port, store).expect("valid config"));

    let parent = Uuid::new_v4();
    coordinator.register_submission(Submission::new(parent, "repo-a", "team-a")).await.unwrap();
    let ticket = coordinator.trigger_job(parent, None).await.unwrap();
    let view = wait_for_job(&coordinator, ticket.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);

    // The failed final persist must not leave the parent's slot claimed.
    coordinator.register_submission(Submission::new(parent, "repo-a", "team-b")).await.unwrap();
    let second = coordinator.trigger_job(parent, None).await.unwrap();
    wait_for_job(&coordinator, second.job_id).await;
}

#[tokio::test]
async fn test_cancel_unknown_job_is_an_error() {
    let backend = Arc::new(MockBackend::new());
    let coordinator = build(fast_config(), &backend, Arc::new(MockSnapshotProvider::new()));
    assert!(matches!(
        coordinator.cancel_job(Uuid::new_v4()).await.unwrap_err(),
        OrchestratorError::JobNotFound(_)
    ));
}
