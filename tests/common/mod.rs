//! Shared fixtures for integration tests: a scripted snapshot provider and
//! canned repository snapshots.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gavel::domain::errors::{DomainResult, OrchestratorError};
use gavel::{JobStatusView, RepoSnapshot, SnapshotFile, SnapshotProvider};
use tokio::sync::Mutex;
use uuid::Uuid;

/// A snapshot of a small, plausible repo for scorers to cite into.
pub fn sample_snapshot() -> RepoSnapshot {
    RepoSnapshot {
        files: vec![
            SnapshotFile { path: "src/main.rs".to_string(), line_count: 120 },
            SnapshotFile { path: "src/auth.rs".to_string(), line_count: 80 },
            SnapshotFile { path: "README.md".to_string(), line_count: 30 },
        ],
        commits: vec!["abc123".to_string(), "def456".to_string()],
        readme: "# Demo project".to_string(),
        source_excerpts: "fn main() {}".to_string(),
    }
}

/// Scripted snapshot provider: maps repo refs to canned snapshots or errors,
/// with an optional artificial delay to widen race windows.
pub struct MockSnapshotProvider {
    snapshots: Mutex<HashMap<String, Result<RepoSnapshot, String>>>,
    delay: Option<Duration>,
}

impl MockSnapshotProvider {
    pub fn new() -> Self {
        Self { snapshots: Mutex::new(HashMap::new()), delay: None }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { snapshots: Mutex::new(HashMap::new()), delay: Some(delay) }
    }

    pub async fn put(&self, repo_ref: impl Into<String>, snapshot: RepoSnapshot) {
        self.snapshots.lock().await.insert(repo_ref.into(), Ok(snapshot));
    }

    pub async fn fail(&self, repo_ref: impl Into<String>, message: impl Into<String>) {
        self.snapshots.lock().await.insert(repo_ref.into(), Err(message.into()));
    }
}

#[async_trait]
impl SnapshotProvider for MockSnapshotProvider {
    async fn get_snapshot(&self, repo_ref: &str) -> DomainResult<RepoSnapshot> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let snapshots = self.snapshots.lock().await;
        match snapshots.get(repo_ref) {
            Some(Ok(snapshot)) => Ok(snapshot.clone()),
            Some(Err(message)) => Err(OrchestratorError::Store(message.clone())),
            None => Err(OrchestratorError::Store(format!("unknown repo ref: {repo_ref}"))),
        }
    }
}

/// Poll a job until it reaches a terminal status, failing the test after a
/// generous deadline.
pub async fn wait_for_job(
    coordinator: &Arc<gavel::JobCoordinator>,
    job_id: Uuid,
) -> JobStatusView {
    for _ in 0..200 {
        let view = coordinator.get_job_status(job_id).await.expect("job should exist");
        if view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not settle in time");
}
