//! The sync orchestrator.
//!
//! One pass per account: refresh credentials, fetch the remote delta,
//! reconcile it into the event cache, persist the cursor, record status.
//! Failures in one account's pass never abort the sibling accounts; the
//! error message lands on the account record for the UI to surface.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use calsync_core::repo::Repos;
use calsync_core::store::ChangeNotifier;
use calsync_core::{Account, SyncResult};
use calsync_providers::{ProviderRegistry, SyncWindow};

use crate::config::EngineConfig;
use crate::credentials::ensure_fresh_credentials;

pub struct SyncEngine {
    repos: Repos,
    registry: Arc<ProviderRegistry>,
    config: EngineConfig,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    /// Per-account mutual exclusion: a manual "sync now" racing the
    /// scheduled pass must serialize, not interleave.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(repos: Repos, registry: Arc<ProviderRegistry>, config: EngineConfig) -> Self {
        SyncEngine {
            repos,
            registry,
            config,
            notifier: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn repos(&self) -> &Repos {
        &self.repos
    }

    async fn account_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Sync one account. Sync failures are recorded on the account and
    /// swallowed; only bookkeeping failures (store writes) propagate.
    pub async fn sync_account_events(&self, account_id: &str) -> SyncResult<()> {
        let account = self.repos.accounts.require(account_id).await?;
        if !account.enabled {
            tracing::debug!(account = %account.id, "skipping disabled account");
            return Ok(());
        }

        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        match self.run_pass(&account).await {
            Ok(()) => {
                self.repos
                    .accounts
                    .record_sync_ok(account_id, Utc::now())
                    .await
            }
            Err(e) => {
                tracing::warn!(account = %account.id, provider = %account.provider, error = %e, "sync pass failed");
                self.repos
                    .accounts
                    .record_sync_error(account_id, &e.to_string(), Utc::now())
                    .await
            }
        }
    }

    async fn run_pass(&self, account: &Account) -> SyncResult<()> {
        let adapter = self.registry.resolve(account.provider)?;
        let credentials =
            ensure_fresh_credentials(account, &self.repos.accounts, &self.config).await?;

        let mut state = self.repos.sync_state.get(&account.id).await?;
        let now = Utc::now();
        let window = SyncWindow::around(now);

        let delta = adapter
            .sync_events(account, &credentials, window, &state.cursor)
            .await?;
        tracing::info!(
            account = %account.id,
            provider = %account.provider,
            events = delta.events.len(),
            deleted = delta.deleted_uids.len(),
            full_sync = delta.full_sync,
            "fetched remote delta"
        );

        for event in delta.events {
            self.repos.events.upsert_by_uid(&account.id, event).await?;
        }
        for uid in &delta.deleted_uids {
            if let Some(cached) = self.repos.events.get_by_uid(&account.id, uid).await? {
                self.repos.events.delete(&cached.id).await?;
            }
        }

        // Either cursor field may come back empty, which forces a full
        // resync next pass.
        state.cursor.sync_token = delta.sync_token;
        state.cursor.delta_link = delta.delta_link;
        state.last_synced_at = Some(now);
        self.repos.sync_state.save(&state).await
    }

    /// One pass over all of a user's accounts, strictly sequential, with
    /// cancellation checked between accounts. The change notification is
    /// emitted once per pass regardless of per-account outcomes.
    pub async fn sync_all_accounts(
        &self,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let accounts = self.repos.accounts.list_for_user(user_id).await?;
        for account in &accounts {
            if cancel.is_cancelled() {
                break;
            }
            self.sync_account_events(&account.id).await?;
        }
        if let Some(ref notifier) = self.notifier {
            notifier.events_changed(user_id).await;
        }
        Ok(())
    }
}
