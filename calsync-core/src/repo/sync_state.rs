//! Sync cursor persistence, one document per account.

use std::sync::Arc;

use crate::error::SyncResult;
use crate::repo::SYNC_STATE;
use crate::store::KeyedStore;
use crate::sync_state::SyncState;

#[derive(Clone)]
pub struct SyncStateRepo {
    store: Arc<dyn KeyedStore>,
}

impl SyncStateRepo {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        SyncStateRepo { store }
    }

    /// Load the account's sync state; a missing document means "no cursor,
    /// next sync is full".
    pub async fn get(&self, account_id: &str) -> SyncResult<SyncState> {
        match self.store.get(SYNC_STATE, account_id).await? {
            Some(doc) => serde_json::from_value(doc).map_err(Into::into),
            None => Ok(SyncState::new(account_id)),
        }
    }

    pub async fn save(&self, state: &SyncState) -> SyncResult<()> {
        self.store
            .put(SYNC_STATE, &state.account_id, serde_json::to_value(state)?)
            .await
    }

    pub async fn clear(&self, account_id: &str) -> SyncResult<()> {
        self.store.delete(SYNC_STATE, account_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn missing_state_means_full_resync() {
        let repo = SyncStateRepo::new(Arc::new(MemoryStore::new()));
        let state = repo.get("acct").await.unwrap();
        assert!(state.cursor.is_empty());
        assert!(state.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn save_and_reload_cursor() {
        let repo = SyncStateRepo::new(Arc::new(MemoryStore::new()));
        let mut state = SyncState::new("acct");
        state.cursor.sync_token = Some("token-1".into());
        state.last_synced_at = Some(Utc::now());
        repo.save(&state).await.unwrap();

        let loaded = repo.get("acct").await.unwrap();
        assert_eq!(loaded.cursor.sync_token.as_deref(), Some("token-1"));
        assert!(loaded.cursor.delta_link.is_none());
    }
}
