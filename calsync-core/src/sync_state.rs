//! Per-account incremental sync cursors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque incremental-sync cursor.
///
/// Google issues a sync token (consumed on the next request and replaced);
/// Microsoft Graph issues a delta link (a full next-page URL consumed
/// verbatim). Absence of both forces a full resync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub sync_token: Option<String>,
    pub delta_link: Option<String>,
}

impl SyncCursor {
    pub fn is_empty(&self) -> bool {
        self.sync_token.is_none() && self.delta_link.is_none()
    }
}

/// Sync bookkeeping for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub account_id: String,
    #[serde(default)]
    pub cursor: SyncCursor,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn new(account_id: &str) -> Self {
        SyncState {
            account_id: account_id.to_string(),
            cursor: SyncCursor::default(),
            last_synced_at: None,
        }
    }
}
