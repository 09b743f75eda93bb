//! Per-user reminder settings, one singleton document per user.

use std::sync::Arc;

use crate::error::SyncResult;
use crate::repo::SETTINGS;
use crate::settings::ReminderSettings;
use crate::store::KeyedStore;

#[derive(Clone)]
pub struct SettingsRepo {
    store: Arc<dyn KeyedStore>,
}

impl SettingsRepo {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        SettingsRepo { store }
    }

    /// Users without stored settings get the defaults.
    pub async fn get(&self, user_id: &str) -> SyncResult<ReminderSettings> {
        match self.store.get(SETTINGS, user_id).await? {
            Some(doc) => serde_json::from_value(doc).map_err(Into::into),
            None => Ok(ReminderSettings::default()),
        }
    }

    pub async fn put(&self, user_id: &str, settings: &ReminderSettings) -> SyncResult<()> {
        self.store
            .put(SETTINGS, user_id, serde_json::to_value(settings)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DEFAULT_REMINDER_MINUTES;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn defaults_until_saved() {
        let repo = SettingsRepo::new(Arc::new(MemoryStore::new()));
        let settings = repo.get("user-1").await.unwrap();
        assert_eq!(settings.reminder_minutes, DEFAULT_REMINDER_MINUTES);

        let custom = ReminderSettings {
            reminder_minutes: 30,
            reminder_instruction: "Mention the agenda".into(),
            accounts_note: String::new(),
        };
        repo.put("user-1", &custom).await.unwrap();
        assert_eq!(repo.get("user-1").await.unwrap(), custom);
    }
}
