//! Snapshot provider port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RepoSnapshot;

/// Out-of-scope repository acquisition. Returns a read-only, size-bounded
/// view of one repository; the orchestration core never touches the network
/// or filesystem itself.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn get_snapshot(&self, repo_ref: &str) -> DomainResult<RepoSnapshot>;
}
