//! In-memory ledger store
//!
//! Used by tests and by nodes started without `DATABASE_URL`. Supports
//! injecting commit failures so callers can check that a failed write has no
//! visible effect.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::LedgerStore;
use crate::error::GatewayError;
use crate::ledger::{LedgerData, StateChange};

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<LedgerData>,
    fail_next: AtomicU32,
    commits: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a storage error
    pub fn fail_next_commits(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self) -> Result<LedgerData, GatewayError> {
        let data = self.data.lock().map_err(|_| GatewayError::Storage {
            reason: "memory store lock poisoned".to_string(),
        })?;
        Ok(data.clone())
    }

    async fn commit(&self, changes: &[StateChange]) -> Result<(), GatewayError> {
        let pending_failures = self.fail_next.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_next.store(pending_failures - 1, Ordering::SeqCst);
            return Err(GatewayError::Storage {
                reason: "injected commit failure".to_string(),
            });
        }

        let mut data = self.data.lock().map_err(|_| GatewayError::Storage {
            reason: "memory store lock poisoned".to_string(),
        })?;
        data.apply_all(changes);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdentityMapping;
    use alloy::primitives::Address;

    fn mapping() -> StateChange {
        StateChange::IdentityMapped(IdentityMapping {
            mainnet: Address::repeat_byte(1),
            sidechain: Address::repeat_byte(2),
        })
    }

    #[tokio::test]
    async fn test_commit_then_load() {
        let store = MemoryStore::new();
        store.commit(&[mapping()]).await.unwrap();
        let data = store.load().await.unwrap();
        assert_eq!(
            data.identities().sidechain_for(&Address::repeat_byte(1)),
            Some(Address::repeat_byte(2))
        );
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        assert!(matches!(
            store.commit(&[mapping()]).await,
            Err(GatewayError::Storage { .. })
        ));
        assert_eq!(store.load().await.unwrap(), LedgerData::default());
        store.commit(&[mapping()]).await.unwrap();
        assert_eq!(store.commit_count(), 1);
    }
}
