//! In-memory store implementations.
//!
//! Used by tests and by embedders that bring no host runtime of their own.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::{SyncError, SyncResult};
use crate::store::{Filter, KeyedStore, Query, SecretStore, SortOrder};

/// Keyed document store backed by a process-local map.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

/// Order JSON values for single-field sorts: numbers numerically, strings
/// lexicographically, everything else by its JSON rendering.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> SyncResult<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> SyncResult<bool> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(collections
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn find(&self, collection: &str, query: Query) -> SyncResult<Vec<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| SyncError::Store(e.to_string()))?;

        let mut matches: Vec<Value> = collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| query.filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, order)) = &query.sort {
            matches.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        let matches: Vec<Value> = matches.into_iter().skip(query.offset).collect();
        Ok(match query.limit {
            Some(limit) => matches.into_iter().take(limit).collect(),
            None => matches,
        })
    }

    async fn find_one(&self, collection: &str, filter: Filter) -> SyncResult<Option<Value>> {
        let mut results = self
            .find(
                collection,
                Query {
                    filter,
                    sort: None,
                    limit: Some(1),
                    offset: 0,
                },
            )
            .await?;
        Ok(results.pop())
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> SyncResult<usize> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| SyncError::Store(e.to_string()))?;

        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let doomed: Vec<String> = docs
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            docs.remove(id);
        }
        Ok(doomed.len())
    }
}

/// Secret store backed by a process-local map.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        MemorySecretStore::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let secrets = self
            .secrets
            .read()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(secrets.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        secrets.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        secrets.remove(key);
        Ok(())
    }
}
