//! Provider adapters for the calsync engine.
//!
//! Each supported provider kind gets one [`adapter::ProviderAdapter`]
//! implementation that normalizes its calendar semantics (full feed
//! refetch, sync-token delta, paged calendar view, CalDAV REPORT) into the
//! common incremental-fetch contract. [`registry::ProviderRegistry`]
//! resolves adapters by the closed [`calsync_core::ProviderKind`] enum.

pub mod adapter;
pub mod caldav;
pub mod google;
pub mod ical;
pub mod icloud;
pub mod oauth;
pub mod outlook;
pub mod registry;

mod http;

pub use adapter::{ProviderAdapter, RemoteCalendar, RemoteDelta, SyncWindow};
pub use registry::ProviderRegistry;
