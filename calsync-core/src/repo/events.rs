//! The local event cache.
//!
//! `(account_id, uid)` is the sole deduplication key: `upsert_by_uid` is the
//! reconciliation primitive the sync orchestrator drives, and callers must
//! pre-synthesize unique uids for recurrence occurrences.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::event::{CachedEvent, EventData, ResponseStatus};
use crate::repo::EVENTS;
use crate::store::{Filter, KeyedStore, Query};

#[derive(Clone)]
pub struct EventCache {
    store: Arc<dyn KeyedStore>,
}

impl EventCache {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        EventCache { store }
    }

    /// List cached events overlapping `[from, to]`, declined events
    /// excluded, sorted by start ascending, offset/limit applied after
    /// filtering.
    pub async fn list(
        &self,
        account_id: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<usize>,
        offset: usize,
    ) -> SyncResult<Vec<CachedEvent>> {
        let mut filter = Filter::new();
        if let Some(account_id) = account_id {
            filter = filter.eq("account_id", account_id);
        }
        let docs = self.store.find(EVENTS, Query::filtered(filter)).await?;

        let mut events: Vec<CachedEvent> = docs
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?;

        events.retain(|event| {
            if event.data.response_status == Some(ResponseStatus::Declined) {
                return false;
            }
            match (from, to) {
                (Some(from), Some(to)) => event.data.overlaps(from, to),
                (Some(from), None) => event.data.end >= from,
                (None, Some(to)) => event.data.start <= to,
                (None, None) => true,
            }
        });
        events.sort_by_key(|event| event.data.start);

        let events: Vec<CachedEvent> = events.into_iter().skip(offset).collect();
        Ok(match limit {
            Some(limit) => events.into_iter().take(limit).collect(),
            None => events,
        })
    }

    pub async fn get_by_uid(
        &self,
        account_id: &str,
        uid: &str,
    ) -> SyncResult<Option<CachedEvent>> {
        let doc = self
            .store
            .find_one(
                EVENTS,
                Filter::new().eq("account_id", account_id).eq("uid", uid),
            )
            .await?;
        doc.map(|doc| serde_json::from_value(doc).map_err(Into::into))
            .transpose()
    }

    /// Insert or update by `(account_id, uid)`. Updates preserve the local
    /// id and `created_at` and rewrite every provider-visible field.
    pub async fn upsert_by_uid(
        &self,
        account_id: &str,
        data: EventData,
    ) -> SyncResult<CachedEvent> {
        let now = Utc::now();
        let event = match self.get_by_uid(account_id, &data.uid).await? {
            Some(existing) => CachedEvent {
                id: existing.id,
                account_id: existing.account_id,
                created_at: existing.created_at,
                updated_at: now,
                data,
            },
            None => CachedEvent {
                id: Uuid::new_v4().to_string(),
                account_id: account_id.to_string(),
                created_at: now,
                updated_at: now,
                data,
            },
        };
        self.store
            .put(EVENTS, &event.id, serde_json::to_value(&event)?)
            .await?;
        Ok(event)
    }

    pub async fn delete(&self, event_id: &str) -> SyncResult<bool> {
        self.store.delete(EVENTS, event_id).await
    }

    /// Bulk delete, used when an account is removed.
    pub async fn delete_by_account(&self, account_id: &str) -> SyncResult<usize> {
        self.store
            .delete_many(EVENTS, Filter::new().eq("account_id", account_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn cache() -> EventCache {
        EventCache::new(Arc::new(MemoryStore::new()))
    }

    fn data(uid: &str, start: DateTime<Utc>, hours: i64) -> EventData {
        EventData::new("cal", uid, uid, start, start + Duration::hours(hours))
    }

    #[tokio::test]
    async fn upsert_twice_preserves_id_and_created_at() {
        let cache = cache();
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        let first = cache.upsert_by_uid("acct", data("uid-1", start, 1)).await.unwrap();

        let mut updated = data("uid-1", start + Duration::hours(1), 2);
        updated.title = "Moved".to_string();
        let second = cache.upsert_by_uid("acct", updated).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.data.title, "Moved");
        assert_eq!(second.data.start, start + Duration::hours(1));

        // Still a single row.
        let all = cache.list(Some("acct"), None, None, None, 0).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn list_excludes_declined_and_sorts_by_start() {
        let cache = cache();
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();

        cache
            .upsert_by_uid("acct", data("later", base + Duration::hours(4), 1))
            .await
            .unwrap();
        cache.upsert_by_uid("acct", data("earlier", base, 1)).await.unwrap();
        let mut declined = data("declined", base + Duration::hours(2), 1);
        declined.response_status = Some(ResponseStatus::Declined);
        cache.upsert_by_uid("acct", declined).await.unwrap();

        let events = cache.list(Some("acct"), None, None, None, 0).await.unwrap();
        let uids: Vec<&str> = events.iter().map(|e| e.data.uid.as_str()).collect();
        assert_eq!(uids, vec!["earlier", "later"]);
    }

    #[tokio::test]
    async fn list_applies_range_overlap_then_offset_and_limit() {
        let cache = cache();
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        for i in 0..5 {
            cache
                .upsert_by_uid("acct", data(&format!("e{}", i), base + Duration::hours(i), 1))
                .await
                .unwrap();
        }

        // Range covering e1..e3 starts, offset 1 limit 1 -> e2.
        let events = cache
            .list(
                Some("acct"),
                Some(base + Duration::hours(1)),
                Some(base + Duration::hours(3)),
                Some(1),
                1,
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.uid, "e2");
    }

    #[tokio::test]
    async fn delete_by_account_leaves_other_accounts_alone() {
        let cache = cache();
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        cache.upsert_by_uid("a1", data("x", base, 1)).await.unwrap();
        cache.upsert_by_uid("a2", data("y", base, 1)).await.unwrap();

        assert_eq!(cache.delete_by_account("a1").await.unwrap(), 1);
        assert!(cache.get_by_uid("a2", "y").await.unwrap().is_some());
    }
}
