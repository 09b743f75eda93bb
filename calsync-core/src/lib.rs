//! Core types for the calsync engine.
//!
//! This crate provides everything the sync engine and the provider adapters
//! share:
//! - `Account`, `CachedEvent` and related types for the local event model
//! - `store` — the host-runtime collaborator interfaces (keyed document
//!   store, secret store, notification sink) plus in-memory implementations
//! - `repo` — typed repositories (accounts, event cache, sync cursors,
//!   settings) built on top of the keyed store
//! - `ics` + `recurrence` — the ICS codec and RRULE expansion
//! - `lru` — the bounded per-process session state store

pub mod account;
pub mod config;
pub mod error;
pub mod event;
pub mod ics;
pub mod lru;
pub mod recurrence;
pub mod repo;
pub mod settings;
pub mod store;
pub mod sync_state;

pub use account::*;
pub use error::{SyncError, SyncResult};
pub use event::*;
pub use settings::ReminderSettings;
pub use sync_state::{SyncCursor, SyncState};
