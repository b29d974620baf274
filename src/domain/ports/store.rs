//! Persistent store port.
//!
//! The store is an out-of-scope collaborator offering get/put plus an atomic
//! conditional write. The conditional write is the only synchronization
//! primitive the core relies on: both the budget counter and the
//! single-flight job guard go through it, never through read-then-write.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;

/// Mutation applied to the current value under the store's atomicity guarantee.
pub type UpdateFn = Box<dyn FnOnce(Option<&Value>) -> Value + Send>;

/// Predicate deciding whether the mutation may be applied.
pub type PredicateFn = Box<dyn FnOnce(Option<&Value>) -> bool + Send>;

/// Outcome of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOutcome {
    Applied,
    /// The predicate rejected the current value; nothing was written.
    /// A failed condition is a conflict signal, not an error.
    ConditionFailed,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> DomainResult<Option<Value>>;

    async fn put(&self, key: &str, value: Value) -> DomainResult<()>;

    /// Atomically evaluate `predicate` against the current value and, if it
    /// accepts, replace the value with `mutation(current)`. No interleaving
    /// write may occur between the predicate check and the write.
    async fn conditional_update(
        &self,
        key: &str,
        mutation: UpdateFn,
        predicate: PredicateFn,
    ) -> DomainResult<ConditionalOutcome>;
}
