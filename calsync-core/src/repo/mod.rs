//! Typed repositories over the keyed document store.

pub mod accounts;
pub mod events;
pub mod settings;
pub mod sync_state;

use std::sync::Arc;

use crate::error::SyncResult;
use crate::store::{KeyedStore, SecretStore};

pub use accounts::AccountsRepo;
pub use events::EventCache;
pub use settings::SettingsRepo;
pub use sync_state::SyncStateRepo;

/// Collection names in the keyed store.
pub const ACCOUNTS: &str = "accounts";
pub const EVENTS: &str = "events";
pub const SYNC_STATE: &str = "sync_state";
pub const SETTINGS: &str = "settings";

/// All repositories, sharing one store pair.
#[derive(Clone)]
pub struct Repos {
    pub accounts: AccountsRepo,
    pub events: EventCache,
    pub sync_state: SyncStateRepo,
    pub settings: SettingsRepo,
}

impl Repos {
    pub fn new(store: Arc<dyn KeyedStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Repos {
            accounts: AccountsRepo::new(store.clone(), secrets),
            events: EventCache::new(store.clone()),
            sync_state: SyncStateRepo::new(store.clone()),
            settings: SettingsRepo::new(store),
        }
    }

    /// Remove an account together with its cached events, its sync cursor
    /// and its credential payload.
    pub async fn delete_account(&self, account_id: &str) -> SyncResult<()> {
        self.events.delete_by_account(account_id).await?;
        self.sync_state.clear(account_id).await?;
        self.accounts.delete(account_id).await?;
        Ok(())
    }
}
