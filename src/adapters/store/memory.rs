//! In-memory key-value store.
//!
//! Backs tests and single-process deployments. The conditional update holds
//! the map lock across predicate evaluation and write, giving the same
//! atomicity a real store's compare-and-swap would.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{ConditionalOutcome, KeyValueStore, PredicateFn, UpdateFn};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> DomainResult<Option<Value>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> DomainResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn conditional_update(
        &self,
        key: &str,
        mutation: UpdateFn,
        predicate: PredicateFn,
    ) -> DomainResult<ConditionalOutcome> {
        let mut entries = self.entries.lock().await;
        let current = entries.get(key);
        if !predicate(current) {
            return Ok(ConditionalOutcome::ConditionFailed);
        }
        let next = mutation(current);
        entries.insert(key.to_string(), next);
        Ok(ConditionalOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_put_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        store.put("k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_conditional_update_applies_when_predicate_holds() {
        let store = MemoryStore::new();
        let outcome = store
            .conditional_update(
                "slot",
                Box::new(|_| json!("taken")),
                Box::new(|current| current.is_none()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ConditionalOutcome::Applied);
        assert_eq!(store.get("slot").await.unwrap(), Some(json!("taken")));
    }

    #[tokio::test]
    async fn test_conditional_update_rejects_and_leaves_value() {
        let store = MemoryStore::new();
        store.put("slot", json!("taken")).await.unwrap();
        let outcome = store
            .conditional_update(
                "slot",
                Box::new(|_| json!("stolen")),
                Box::new(|current| current.is_none()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ConditionalOutcome::ConditionFailed);
        assert_eq!(store.get("slot").await.unwrap(), Some(json!("taken")));
    }

    #[tokio::test]
    async fn test_concurrent_claims_yield_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .conditional_update(
                        "slot",
                        Box::new(move |_| json!(i)),
                        Box::new(|current| current.is_none()),
                    )
                    .await
                    .unwrap()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() == ConditionalOutcome::Applied {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
