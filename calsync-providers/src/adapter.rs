//! The common provider capability interface.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use calsync_core::config::{SYNC_WINDOW_FUTURE_DAYS, SYNC_WINDOW_PAST_DAYS};
use calsync_core::{
    Account, Credentials, EventData, ProviderKind, SyncCursor, SyncError, SyncResult,
};

/// The time range a sync pass covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        SyncWindow { from, to }
    }

    /// The standard window: 7 days of history, 90 days ahead.
    pub fn around(now: DateTime<Utc>) -> Self {
        SyncWindow {
            from: now - Duration::days(SYNC_WINDOW_PAST_DAYS),
            to: now + Duration::days(SYNC_WINDOW_FUTURE_DAYS),
        }
    }
}

/// A calendar on the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCalendar {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub read_only: bool,
}

/// The result of one incremental fetch.
///
/// `full_sync` records whether `events` is the complete remote state for
/// the window or only a delta on top of it.
#[derive(Debug, Default)]
pub struct RemoteDelta {
    pub events: Vec<EventData>,
    /// Tombstones: uids the remote reported as deleted/cancelled.
    pub deleted_uids: Vec<String>,
    /// Google-style cursor for the next pass.
    pub sync_token: Option<String>,
    /// Microsoft-style cursor for the next pass.
    pub delta_link: Option<String>,
    pub full_sync: bool,
}

/// One implementation per provider kind; every operation is scoped to a
/// single account and its credentials.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Static capability flag; adapters without write support fail every
    /// mutation with a read-only error.
    fn supports_write(&self) -> bool;

    /// Minimal authenticated read; fails with a descriptive error when the
    /// remote is unreachable, unauthenticated or malformed.
    async fn test_connection(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<()>;

    async fn list_calendars(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<Vec<RemoteCalendar>>;

    /// The central incremental-fetch contract (see [`RemoteDelta`]).
    async fn sync_events(
        &self,
        account: &Account,
        credentials: &Credentials,
        window: SyncWindow,
        cursor: &SyncCursor,
    ) -> SyncResult<RemoteDelta>;

    async fn create_event(
        &self,
        account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<EventData>;

    async fn update_event(
        &self,
        account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<EventData>;

    async fn delete_event(
        &self,
        account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<()>;
}

/// The failure every read-only adapter returns from its mutation methods.
pub(crate) fn read_only_error(kind: ProviderKind) -> SyncError {
    SyncError::ReadOnly(format!("{} accounts do not support writes", kind))
}
