//! Job coordinator: the top-level analysis state machine.
//!
//! Advances a job through `queued -> running -> {completed, failed}` and each
//! submission through `pending -> cloning -> analyzing -> {completed, failed}`.
//! Responsibilities, in pipeline order:
//!
//! 1. Single-flight trigger guard: at most one non-terminal job per parent
//!    entity, enforced by an atomic conditional write on the parent's
//!    active-job key. The racer that loses gets [`OrchestratorError::JobConflict`].
//! 2. Pre-flight budget estimate: may reject the whole batch before any work.
//! 3. Bounded worker pool over submissions; per-submission scorer fan-out,
//!    each invocation gated by a running budget reservation.
//! 4. Evidence validation strictly before aggregation.
//! 5. Cost recording for every completed invocation, including those of
//!    cancelled or timed-out submissions: partial spend is always accounted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::{
    AggregatedScore, Config, CostRecord, CostScope, FailureReason, Job, JobProgress, JobStatus,
    RepoSnapshot, Rubric, ScoreResult, Submission, SubmissionStatus,
};
use crate::domain::ports::{
    ConditionalOutcome, EvaluationContext, KeyValueStore, Scorer, SnapshotProvider,
};
use crate::services::budget_guard::{BudgetDecision, BudgetGuard, CostRange};
use crate::services::cost_ledger::CostLedger;
use crate::services::{evidence_validator, pricing, score_aggregator};

/// Returned to the caller that successfully triggered a job.
#[derive(Debug, Clone, Copy)]
pub struct JobTicket {
    pub job_id: Uuid,
    pub estimated_cost: CostRange,
}

/// Point-in-time view of a job for status polling.
#[derive(Debug, Clone)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub progress: JobProgress,
    pub cost_usd: f64,
}

/// Result of a submission lookup.
#[derive(Debug, Clone)]
pub enum SubmissionResultView {
    /// Not yet analyzed (or mid-analysis).
    Pending,
    Completed(AggregatedScore),
    Failed(FailureReason),
}

/// Store key holding the id of the parent's currently running job.
fn active_job_key(parent_id: Uuid) -> String {
    format!("active_job:{parent_id}")
}

fn submission_key(id: Uuid) -> String {
    format!("submission:{id}")
}

fn job_key(id: Uuid) -> String {
    format!("job:{id}")
}

/// Outcome of one scorer invocation during fan-out.
enum ScorerOutcome {
    Scored(ScoreResult),
    Failed(String),
    BudgetSkipped,
}

pub struct JobCoordinator {
    config: Config,
    rubric: Rubric,
    scorers: Vec<Arc<dyn Scorer>>,
    snapshot_provider: Arc<dyn SnapshotProvider>,
    store: Arc<dyn KeyValueStore>,
    ledger: CostLedger,
    budget: Arc<BudgetGuard>,
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    submissions: Arc<RwLock<HashMap<Uuid, Submission>>>,
    /// Per-job cancellation flags; flipping one cancels that job's workers
    /// cooperatively at their next suspension point.
    cancel_flags: Arc<RwLock<HashMap<Uuid, watch::Sender<bool>>>>,
}

impl JobCoordinator {
    /// Build a coordinator. The rubric is validated here, at configuration
    /// time; aggregation later assumes it holds.
    pub fn new(
        config: Config,
        scorers: Vec<Arc<dyn Scorer>>,
        snapshot_provider: Arc<dyn SnapshotProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> DomainResult<Self> {
        let rubric = config.rubric();
        rubric.validate()?;
        config.bands.validate()?;

        let ledger = CostLedger::new();
        let budget =
            Arc::new(BudgetGuard::new(Arc::clone(&store), ledger.clone(), config.budget.clone()));

        Ok(Self {
            config,
            rubric,
            scorers,
            snapshot_provider,
            store,
            ledger,
            budget,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            submissions: Arc::new(RwLock::new(HashMap::new())),
            cancel_flags: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn budget(&self) -> &BudgetGuard {
        &self.budget
    }

    // -------------------------------------------------------------------------
    // Submission registry
    // -------------------------------------------------------------------------

    /// Register a submission for later analysis.
    pub async fn register_submission(&self, submission: Submission) -> DomainResult<()> {
        self.persist_submission(&submission).await?;
        let mut submissions = self.submissions.write().await;
        submissions.insert(submission.id, submission);
        Ok(())
    }

    /// Delete a submission. Only `pending` submissions may be deleted; a
    /// submission owned by a job stays for its lifetime.
    pub async fn delete_submission(&self, id: Uuid) -> DomainResult<()> {
        let mut submissions = self.submissions.write().await;
        let submission =
            submissions.get(&id).ok_or(OrchestratorError::SubmissionNotFound(id))?;
        if submission.status != SubmissionStatus::Pending {
            return Err(OrchestratorError::InvalidStateTransition {
                from: submission.status.as_str().to_string(),
                to: "deleted".to_string(),
            });
        }
        submissions.remove(&id);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Public operations
    // -------------------------------------------------------------------------

    /// Trigger a batch-analysis job for a parent entity.
    ///
    /// Exactly one concurrent caller wins; the rest receive
    /// [`OrchestratorError::JobConflict`] and must not auto-retry. The job
    /// runs in the background; poll with [`get_job_status`](Self::get_job_status).
    pub async fn trigger_job(
        self: &Arc<Self>,
        parent_id: Uuid,
        submission_ids: Option<Vec<Uuid>>,
    ) -> DomainResult<JobTicket> {
        let targets = self.resolve_targets(parent_id, submission_ids).await?;
        if targets.is_empty() {
            return Err(OrchestratorError::NoSubmissions(parent_id));
        }

        let mut job = Job::new(parent_id, targets.clone());
        let job_id = job.id;

        // Single-flight claim: transition the parent's active-job key from
        // absent/null to this job id. Losing the race is a conflict, not an
        // error; no job record is created for the loser.
        let claim = self
            .store
            .conditional_update(
                &active_job_key(parent_id),
                Box::new(move |_| json!(job_id.to_string())),
                Box::new(|current: Option<&Value>| {
                    current.is_none() || current == Some(&Value::Null)
                }),
            )
            .await?;
        if claim == ConditionalOutcome::ConditionFailed {
            return Err(OrchestratorError::JobConflict(parent_id));
        }

        // Pre-flight estimate against the remaining budget. A batch that
        // cannot possibly fit is rejected before any work starts.
        let enabled = self.config.enabled_scorers();
        let estimate = self.budget.estimated_cost(targets.len(), &enabled).await;
        let remaining = self.budget.cap_usd() - self.budget.reserved(parent_id).await?;
        if estimate.low_usd > remaining {
            job.error = Some(format!(
                "pre-flight estimate {:.2}-{:.2} USD exceeds remaining budget {remaining:.2} USD",
                estimate.low_usd, estimate.high_usd
            ));
            job.transition_to(JobStatus::Failed)?;
            self.finish_job(&job).await?;
            return Err(OrchestratorError::BudgetExceeded {
                estimated_max: estimate.low_usd,
                cap: self.budget.cap_usd(),
            });
        }
        if estimate.high_usd > remaining {
            warn!(
                %parent_id,
                high_usd = estimate.high_usd,
                remaining_usd = remaining,
                "Estimated cost may exceed remaining budget; scorers will be budget-gated"
            );
        }

        self.persist_job(&job).await?;
        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(job_id, job);
        }
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut flags = self.cancel_flags.write().await;
            flags.insert(job_id, cancel_tx);
        }

        info!(%parent_id, %job_id, submissions = targets.len(), "Job triggered");

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = coordinator.run_job(job_id, cancel_rx).await {
                error!(%job_id, error = %err, "Job run failed");
            }
        });

        Ok(JobTicket { job_id, estimated_cost: estimate })
    }

    /// Status, progress, and spend-so-far for a job.
    pub async fn get_job_status(&self, job_id: Uuid) -> DomainResult<JobStatusView> {
        let job = {
            let jobs = self.jobs.read().await;
            jobs.get(&job_id).cloned().ok_or(OrchestratorError::JobNotFound(job_id))?
        };
        let cost_usd = self.ledger.total(CostScope::Job(job_id)).await;
        Ok(JobStatusView { status: job.status, progress: job.progress, cost_usd })
    }

    /// Final (or in-flight) result for a submission.
    pub async fn get_submission_result(&self, id: Uuid) -> DomainResult<SubmissionResultView> {
        let submissions = self.submissions.read().await;
        let submission =
            submissions.get(&id).ok_or(OrchestratorError::SubmissionNotFound(id))?;
        Ok(match submission.status {
            SubmissionStatus::Completed => {
                submission.score.clone().map_or(SubmissionResultView::Pending, SubmissionResultView::Completed)
            }
            SubmissionStatus::Failed => SubmissionResultView::Failed(
                submission
                    .failure
                    .clone()
                    .unwrap_or_else(|| FailureReason::step("unknown")),
            ),
            _ => SubmissionResultView::Pending,
        })
    }

    /// Cooperatively cancel a running job. In-flight workers stop at their
    /// next suspension point; already-written cost records and validated
    /// evidence are kept.
    pub async fn cancel_job(&self, job_id: Uuid) -> DomainResult<()> {
        let flags = self.cancel_flags.read().await;
        let tx = flags.get(&job_id).ok_or(OrchestratorError::JobNotFound(job_id))?;
        let _ = tx.send(true);
        info!(%job_id, "Job cancellation requested");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Job execution
    // -------------------------------------------------------------------------

    async fn run_job(self: &Arc<Self>, job_id: Uuid, cancel_rx: watch::Receiver<bool>) -> DomainResult<()> {
        let (parent_id, targets) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(&job_id).ok_or(OrchestratorError::JobNotFound(job_id))?;
            job.transition_to(JobStatus::Running)?;
            (job.parent_id, job.submission_ids.clone())
        };
        self.persist_current_job(job_id).await?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut handles = Vec::with_capacity(targets.len());

        for submission_id in targets {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| OrchestratorError::Store("worker pool closed".to_string()))?;
            let coordinator = Arc::clone(self);
            let cancel_rx = cancel_rx.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let completed = coordinator
                    .process_submission(job_id, submission_id, cancel_rx)
                    .await;
                coordinator.record_settled(job_id, completed).await;
            }));
        }

        for handle in handles {
            // A panicked worker settles its submission as failed.
            if let Err(err) = handle.await {
                error!(%job_id, error = %err, "Submission worker panicked");
            }
        }

        let cancelled = *cancel_rx.borrow();
        {
            let cost = self.ledger.total(CostScope::Job(job_id)).await;
            let mut jobs = self.jobs.write().await;
            if let Some(job) = jobs.get_mut(&job_id) {
                job.cost_usd = cost;
                if cancelled {
                    job.error = Some("cancelled".to_string());
                    job.transition_to(JobStatus::Failed)?;
                } else {
                    // Individual submission failures do not fail the job.
                    job.transition_to(JobStatus::Completed)?;
                }
            }
        }
        // Release the single-flight slot before the final persist: a persist
        // error must not leave the parent permanently locked.
        self.release_slot(parent_id, job_id).await?;
        self.persist_current_job(job_id).await?;
        info!(%job_id, cancelled, "Job finished");
        Ok(())
    }

    /// Walk one submission through `cloning -> analyzing -> terminal`.
    /// Returns true if it completed, false if it failed.
    async fn process_submission(
        &self,
        job_id: Uuid,
        submission_id: Uuid,
        cancel_rx: watch::Receiver<bool>,
    ) -> bool {
        match self.analyze_submission(job_id, submission_id, cancel_rx).await {
            Ok(completed) => completed,
            Err(err) => {
                warn!(%submission_id, error = %err, "Submission failed");
                let reason = match &err {
                    OrchestratorError::SnapshotUnavailable { message, .. } => {
                        let mut r = FailureReason::step("snapshot");
                        r.scorer_errors = vec![message.clone()];
                        r
                    }
                    OrchestratorError::Cancelled => FailureReason::step("cancelled"),
                    other => FailureReason::step(other.to_string()),
                };
                let _ = self.fail_submission(submission_id, reason).await;
                false
            }
        }
    }

    /// Returns `Ok(true)` when the submission completed, `Ok(false)` when it
    /// was marked failed in here (all scorers failed), `Err` when the caller
    /// must mark it failed.
    async fn analyze_submission(
        &self,
        job_id: Uuid,
        submission_id: Uuid,
        cancel_rx: watch::Receiver<bool>,
    ) -> DomainResult<bool> {
        let (parent_id, repo_ref, team_name) = {
            let mut submissions = self.submissions.write().await;
            let submission = submissions
                .get_mut(&submission_id)
                .ok_or(OrchestratorError::SubmissionNotFound(submission_id))?;
            submission.transition_to(SubmissionStatus::Cloning)?;
            (submission.parent_id, submission.repo_ref.clone(), submission.team_name.clone())
        };
        self.persist_current_submission(submission_id).await?;

        if *cancel_rx.borrow() {
            return Err(OrchestratorError::Cancelled);
        }

        // One deadline spans snapshot acquisition and scorer fan-out, so a
        // hung provider cannot stall the worker past the submission timeout.
        let deadline = Instant::now() + Duration::from_secs(self.config.submission_timeout_secs);
        let snapshot = match timeout_at(deadline, self.snapshot_provider.get_snapshot(&repo_ref))
            .await
        {
            Ok(result) => result.map_err(|err| OrchestratorError::SnapshotUnavailable {
                submission_id,
                message: err.to_string(),
            })?,
            Err(_) => {
                return Err(OrchestratorError::SnapshotUnavailable {
                    submission_id,
                    message: "snapshot acquisition timed out".to_string(),
                })
            }
        };

        if *cancel_rx.borrow() {
            return Err(OrchestratorError::Cancelled);
        }

        {
            let mut submissions = self.submissions.write().await;
            let submission = submissions
                .get_mut(&submission_id)
                .ok_or(OrchestratorError::SubmissionNotFound(submission_id))?;
            submission.transition_to(SubmissionStatus::Analyzing)?;
        }
        self.persist_current_submission(submission_id).await?;

        let ctx = EvaluationContext { submission_id, team_name };
        let outcomes = self
            .fan_out_scorers(parent_id, job_id, &ctx, &snapshot, cancel_rx, deadline)
            .await;

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut skipped = 0usize;
        for outcome in outcomes {
            match outcome {
                ScorerOutcome::Scored(result) => results.push(result),
                ScorerOutcome::Failed(message) => errors.push(message),
                ScorerOutcome::BudgetSkipped => skipped += 1,
            }
        }

        if results.is_empty() && !errors.is_empty() {
            self.fail_submission(submission_id, FailureReason::scoring(errors)).await?;
            return Ok(false);
        }

        // Evidence validation strictly precedes aggregation; no finding is
        // shown downstream unchecked.
        for result in &mut results {
            result.evidence = evidence_validator::verify_all(&result.evidence, &snapshot);
            evidence_validator::log_unverified(submission_id, &result.evidence);
        }
        let all_evidence: Vec<_> =
            results.iter().flat_map(|r| r.evidence.iter().cloned()).collect();
        let rate = evidence_validator::verification_rate(&all_evidence);
        if rate < self.config.verification_alert_threshold {
            // Low verification is a data-quality signal, not a failure.
            error!(
                %submission_id,
                verification_rate = rate,
                threshold = self.config.verification_alert_threshold,
                alert = "critical",
                "Evidence verification rate below threshold"
            );
        }

        let score = score_aggregator::aggregate(&self.rubric, &results, self.config.bands);
        info!(
            %submission_id,
            overall = score.overall,
            confidence = score.confidence,
            scorers_failed = errors.len(),
            scorers_skipped = skipped,
            "Submission analyzed"
        );

        {
            let mut submissions = self.submissions.write().await;
            let submission = submissions
                .get_mut(&submission_id)
                .ok_or(OrchestratorError::SubmissionNotFound(submission_id))?;
            submission.complete(score)?;
        }
        self.persist_current_submission(submission_id).await?;
        Ok(true)
    }

    /// Invoke all enabled scorers concurrently against a shared snapshot,
    /// each gated by a running budget reservation, bounded by the submission
    /// deadline. Completed outcomes survive the timeout.
    async fn fan_out_scorers(
        &self,
        parent_id: Uuid,
        job_id: Uuid,
        ctx: &EvaluationContext,
        snapshot: &RepoSnapshot,
        cancel_rx: watch::Receiver<bool>,
        deadline: Instant,
    ) -> Vec<ScorerOutcome> {
        let settled: Arc<Mutex<Vec<ScorerOutcome>>> = Arc::new(Mutex::new(Vec::new()));

        let fan_out = futures::future::join_all(self.scorers.iter().map(|scorer| {
            let settled = Arc::clone(&settled);
            let cancel_rx = cancel_rx.clone();
            async move {
                let outcome = self
                    .invoke_scorer(parent_id, job_id, ctx, snapshot, scorer.as_ref(), cancel_rx)
                    .await;
                settled.lock().await.push(outcome);
            }
        }));

        if timeout_at(deadline, fan_out).await.is_err() {
            warn!(
                submission_id = %ctx.submission_id,
                timeout_secs = self.config.submission_timeout_secs,
                "Submission timed out; pending scorers cancelled, completed results kept"
            );
            let mut outcomes = std::mem::take(&mut *settled.lock().await);
            outcomes.push(ScorerOutcome::Failed("submission analysis timed out".to_string()));
            return outcomes;
        }

        let outcomes = std::mem::take(&mut *settled.lock().await);
        outcomes
    }

    async fn invoke_scorer(
        &self,
        parent_id: Uuid,
        job_id: Uuid,
        ctx: &EvaluationContext,
        snapshot: &RepoSnapshot,
        scorer: &dyn Scorer,
        cancel_rx: watch::Receiver<bool>,
    ) -> ScorerOutcome {
        if *cancel_rx.borrow() {
            return ScorerOutcome::Failed("cancelled".to_string());
        }

        // Reserve the worst-case invocation cost before invoking; a denial is
        // a skip, never a retry. The reservation is settled down to the
        // actual cost once the reply has been priced.
        let reserved = self.budget.reservation_usd();
        match self.budget.check_and_reserve(parent_id, reserved).await {
            Ok(BudgetDecision::Allowed) => {}
            Ok(BudgetDecision::Denied) => {
                info!(
                    submission_id = %ctx.submission_id,
                    scorer = scorer.name(),
                    reserved_usd = reserved,
                    "Scorer skipped: budget reservation denied"
                );
                return ScorerOutcome::BudgetSkipped;
            }
            Err(err) => return ScorerOutcome::Failed(err.to_string()),
        }

        match scorer.evaluate(ctx, snapshot).await {
            Ok(evaluation) => {
                let cost_usd = pricing::compute_cost(
                    scorer.model(),
                    evaluation.input_tokens,
                    evaluation.output_tokens,
                );
                self.ledger
                    .record(CostRecord::new(
                        parent_id,
                        job_id,
                        ctx.submission_id,
                        scorer.name(),
                        scorer.model(),
                        evaluation.input_tokens,
                        evaluation.output_tokens,
                        cost_usd,
                    ))
                    .await;
                // True up the counter so it tracks real spend, not estimates.
                if let Err(err) = self.budget.settle(parent_id, reserved, cost_usd).await {
                    warn!(
                        submission_id = %ctx.submission_id,
                        scorer = scorer.name(),
                        error = %err,
                        "Failed to settle budget reservation"
                    );
                }
                ScorerOutcome::Scored(evaluation.score)
            }
            Err(err) => {
                // A failed invocation spent nothing; free its reservation.
                if let Err(settle_err) = self.budget.settle(parent_id, reserved, 0.0).await {
                    warn!(
                        submission_id = %ctx.submission_id,
                        scorer = scorer.name(),
                        error = %settle_err,
                        "Failed to release budget reservation"
                    );
                }
                ScorerOutcome::Failed(format!("{}: {err}", scorer.name()))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Bookkeeping
    // -------------------------------------------------------------------------

    async fn resolve_targets(
        &self,
        parent_id: Uuid,
        submission_ids: Option<Vec<Uuid>>,
    ) -> DomainResult<Vec<Uuid>> {
        let submissions = self.submissions.read().await;
        match submission_ids {
            Some(ids) => {
                // Explicit ids are deduplicated, and anything already past
                // `pending` is dropped rather than re-analyzed.
                let mut seen = HashSet::new();
                let mut targets = Vec::new();
                for id in ids {
                    let submission =
                        submissions.get(&id).ok_or(OrchestratorError::SubmissionNotFound(id))?;
                    if submission.parent_id != parent_id {
                        return Err(OrchestratorError::SubmissionNotFound(id));
                    }
                    if submission.status == SubmissionStatus::Pending && seen.insert(id) {
                        targets.push(id);
                    }
                }
                Ok(targets)
            }
            None => Ok(submissions
                .values()
                .filter(|s| s.parent_id == parent_id && s.status == SubmissionStatus::Pending)
                .map(|s| s.id)
                .collect()),
        }
    }

    async fn record_settled(&self, job_id: Uuid, completed: bool) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            if completed {
                job.progress.completed += 1;
            } else {
                job.progress.failed += 1;
            }
        }
    }

    async fn fail_submission(&self, id: Uuid, reason: FailureReason) -> DomainResult<()> {
        {
            let mut submissions = self.submissions.write().await;
            let submission =
                submissions.get_mut(&id).ok_or(OrchestratorError::SubmissionNotFound(id))?;
            submission.fail(reason)?;
        }
        self.persist_current_submission(id).await
    }

    /// Release the parent's single-flight slot, but only if this job still
    /// holds it.
    async fn release_slot(&self, parent_id: Uuid, job_id: Uuid) -> DomainResult<()> {
        let expected = json!(job_id.to_string());
        self.store
            .conditional_update(
                &active_job_key(parent_id),
                Box::new(|_| Value::Null),
                Box::new(move |current: Option<&Value>| current == Some(&expected)),
            )
            .await?;
        Ok(())
    }

    async fn finish_job(&self, job: &Job) -> DomainResult<()> {
        self.persist_job(job).await?;
        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(job.id, job.clone());
        }
        self.release_slot(job.parent_id, job.id).await
    }

    async fn persist_job(&self, job: &Job) -> DomainResult<()> {
        let value = serde_json::to_value(job)?;
        self.store.put(&job_key(job.id), value).await
    }

    async fn persist_current_job(&self, job_id: Uuid) -> DomainResult<()> {
        let job = {
            let jobs = self.jobs.read().await;
            jobs.get(&job_id).cloned()
        };
        match job {
            Some(job) => self.persist_job(&job).await,
            None => Err(OrchestratorError::JobNotFound(job_id)),
        }
    }

    async fn persist_submission(&self, submission: &Submission) -> DomainResult<()> {
        let value = serde_json::to_value(submission)?;
        self.store.put(&submission_key(submission.id), value).await
    }

    async fn persist_current_submission(&self, id: Uuid) -> DomainResult<()> {
        let submission = {
            let submissions = self.submissions.read().await;
            submissions.get(&id).cloned()
        };
        match submission {
            Some(s) => self.persist_submission(&s).await,
            None => Err(OrchestratorError::SubmissionNotFound(id)),
        }
    }
}
