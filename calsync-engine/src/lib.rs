//! The calsync engine: credential refresh, sync orchestration, reminders
//! and the per-user background scheduling loop.
//!
//! The engine sits between the host runtime (which provides storage,
//! secrets and the notification sink via the `calsync_core::store` traits)
//! and the provider adapters in `calsync_providers`. A typical embedding:
//!
//! ```no_run
//! use std::sync::Arc;
//! use calsync_core::repo::Repos;
//! use calsync_core::store::memory::{MemorySecretStore, MemoryStore};
//! use calsync_engine::{EngineConfig, ReminderEngine, SyncEngine, WorkerRegistry};
//! use calsync_providers::ProviderRegistry;
//!
//! # use calsync_core::store::NotificationSink;
//! # use calsync_core::SyncResult;
//! # struct LogSink;
//! # #[async_trait::async_trait]
//! # impl NotificationSink for LogSink {
//! #     async fn deliver(&self, _user_id: &str, _text: &str) -> SyncResult<()> { Ok(()) }
//! # }
//! # async fn run() {
//! let repos = Repos::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemorySecretStore::new()),
//! );
//! let sync = Arc::new(SyncEngine::new(
//!     repos.clone(),
//!     Arc::new(ProviderRegistry::builtin()),
//!     EngineConfig::default(),
//! ));
//! let reminders = Arc::new(ReminderEngine::new(repos, Arc::new(LogSink)));
//! let registry = WorkerRegistry::new(sync, reminders);
//! registry.start("user-1").await;
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod reminders;
pub mod scheduler;
pub mod sync;

pub use config::EngineConfig;
pub use credentials::ensure_fresh_credentials;
pub use reminders::ReminderEngine;
pub use scheduler::WorkerRegistry;
pub use sync::SyncEngine;
