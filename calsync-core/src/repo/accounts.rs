//! Account persistence.
//!
//! Account documents live in the keyed store; credential payloads are kept
//! exclusively in the secret store under `credentials/{account_id}`.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::account::{Account, Credentials, OAuthTokens};
use crate::error::{SyncError, SyncResult};
use crate::repo::ACCOUNTS;
use crate::store::{Filter, KeyedStore, Query, SecretStore};

fn secret_key(account_id: &str) -> String {
    format!("credentials/{}", account_id)
}

#[derive(Clone)]
pub struct AccountsRepo {
    store: Arc<dyn KeyedStore>,
    secrets: Arc<dyn SecretStore>,
}

impl AccountsRepo {
    pub fn new(store: Arc<dyn KeyedStore>, secrets: Arc<dyn SecretStore>) -> Self {
        AccountsRepo { store, secrets }
    }

    pub async fn get(&self, account_id: &str) -> SyncResult<Option<Account>> {
        let doc = self.store.get(ACCOUNTS, account_id).await?;
        doc.map(|doc| serde_json::from_value(doc).map_err(Into::into))
            .transpose()
    }

    pub async fn require(&self, account_id: &str) -> SyncResult<Account> {
        self.get(account_id)
            .await?
            .ok_or_else(|| SyncError::AccountNotFound(account_id.to_string()))
    }

    pub async fn list_for_user(&self, user_id: &str) -> SyncResult<Vec<Account>> {
        let docs = self
            .store
            .find(ACCOUNTS, Query::filtered(Filter::new().eq("user_id", user_id)))
            .await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Into::into))
            .collect()
    }

    pub async fn put(&self, account: &Account) -> SyncResult<()> {
        self.store
            .put(ACCOUNTS, &account.id, serde_json::to_value(account)?)
            .await
    }

    /// Store the credential payload, enforcing the auth-kind invariant.
    pub async fn save_credentials(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<()> {
        if !account.credentials_match(credentials) {
            return Err(SyncError::CredentialMismatch(format!(
                "account '{}' declares {:?} auth",
                account.id, account.auth_kind
            )));
        }
        let payload = serde_json::to_string(credentials)?;
        self.secrets.set(&secret_key(&account.id), &payload).await
    }

    /// Load the credential payload; accounts without one authenticate as
    /// [`Credentials::None`].
    pub async fn credentials(&self, account_id: &str) -> SyncResult<Credentials> {
        match self.secrets.get(&secret_key(account_id)).await? {
            Some(payload) => {
                serde_json::from_str(&payload).map_err(|e| SyncError::Serialization(e.to_string()))
            }
            None => Ok(Credentials::None),
        }
    }

    /// Persist a refreshed OAuth2 token pair.
    pub async fn update_oauth_tokens(
        &self,
        account_id: &str,
        tokens: &OAuthTokens,
    ) -> SyncResult<()> {
        let payload = serde_json::to_string(&Credentials::OAuth2(tokens.clone()))?;
        self.secrets.set(&secret_key(account_id), &payload).await
    }

    /// Record a successful sync, clearing any previous error.
    pub async fn record_sync_ok(&self, account_id: &str, at: DateTime<Utc>) -> SyncResult<()> {
        let mut account = self.require(account_id).await?;
        account.last_synced_at = Some(at);
        account.last_error = None;
        account.last_error_at = None;
        self.put(&account).await
    }

    /// Record a failed sync; the message is what the UI surfaces.
    pub async fn record_sync_error(
        &self,
        account_id: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let mut account = self.require(account_id).await?;
        account.last_error = Some(message.to_string());
        account.last_error_at = Some(at);
        self.put(&account).await
    }

    pub async fn delete(&self, account_id: &str) -> SyncResult<()> {
        self.secrets.delete(&secret_key(account_id)).await?;
        self.store.delete(ACCOUNTS, account_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AuthKind, ProviderKind};
    use crate::store::memory::{MemorySecretStore, MemoryStore};

    fn repo() -> AccountsRepo {
        AccountsRepo::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySecretStore::new()),
        )
    }

    #[tokio::test]
    async fn save_credentials_rejects_mismatched_variant() {
        let repo = repo();
        let mut account = Account::new("user-1", ProviderKind::Google, "Work");
        account.auth_kind = AuthKind::OAuth2;
        repo.put(&account).await.unwrap();

        let err = repo
            .save_credentials(
                &account,
                &Credentials::Password {
                    username: "u".into(),
                    password: "p".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CredentialMismatch(_)));
    }

    #[tokio::test]
    async fn record_sync_error_then_ok_clears_the_error() {
        let repo = repo();
        let account = Account::new("user-1", ProviderKind::Ical, "Feed");
        repo.put(&account).await.unwrap();

        let now = Utc::now();
        repo.record_sync_error(&account.id, "HTTP 500: feed unreachable", now)
            .await
            .unwrap();
        let stored = repo.require(&account.id).await.unwrap();
        assert_eq!(
            stored.last_error.as_deref(),
            Some("HTTP 500: feed unreachable")
        );
        assert!(stored.last_error_at.is_some());

        repo.record_sync_ok(&account.id, now).await.unwrap();
        let stored = repo.require(&account.id).await.unwrap();
        assert!(stored.last_error.is_none());
        assert_eq!(stored.last_synced_at, Some(now));
    }

    #[tokio::test]
    async fn credentials_default_to_none_when_unset() {
        let repo = repo();
        assert_eq!(
            repo.credentials("missing").await.unwrap(),
            Credentials::None
        );
    }
}
