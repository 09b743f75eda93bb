//! Host-runtime collaborator interfaces.
//!
//! The hosting runtime supplies persistence, secrets and the notification
//! channel; the engine only ever talks to these traits. [`memory`] provides
//! in-process implementations used by tests and embedders without a host.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;

/// Sort direction for [`Query::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Simple equality filter: every `(field, value)` pair must match the
/// document's top-level field.
#[derive(Debug, Clone, Default)]
pub struct Filter(pub Vec<(String, Value)>);

impl Filter {
    pub fn new() -> Self {
        Filter(Vec::new())
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// A find query: equality filter plus optional sort/limit/offset.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn filtered(filter: Filter) -> Self {
        Query {
            filter,
            ..Query::default()
        }
    }
}

/// Persistent keyed storage over named collections of JSON documents.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Value>>;
    async fn put(&self, collection: &str, id: &str, doc: Value) -> SyncResult<()>;
    /// Returns true when a document was actually removed.
    async fn delete(&self, collection: &str, id: &str) -> SyncResult<bool>;
    async fn find(&self, collection: &str, query: Query) -> SyncResult<Vec<Value>>;
    async fn find_one(&self, collection: &str, filter: Filter) -> SyncResult<Option<Value>>;
    /// Removes every document matching the filter; returns the count.
    async fn delete_many(&self, collection: &str, filter: Filter) -> SyncResult<usize>;
}

/// Secret storage for credential payloads, kept out of the primary store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> SyncResult<()>;
    async fn delete(&self, key: &str) -> SyncResult<()>;
}

/// Delivery channel for reminder notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, user_id: &str, text: &str) -> SyncResult<()>;
}

/// Optional display metadata for reminder personalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub locale: Option<String>,
}

/// User profile lookup; failures are treated as "no profile".
#[async_trait]
pub trait UserProfiles: Send + Sync {
    async fn lookup(&self, user_id: &str) -> SyncResult<Option<UserProfile>>;
}

/// Notified once per sync-all pass so consumers can refresh their views.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn events_changed(&self, user_id: &str);
}
