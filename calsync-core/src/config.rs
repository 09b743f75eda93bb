//! Shared configuration types and engine tuning constants.

use serde::{Deserialize, Serialize};

/// OAuth2 client registration for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    /// Public clients (the built-in Outlook app registration) have no secret.
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Days of history fetched on every sync pass.
pub const SYNC_WINDOW_PAST_DAYS: i64 = 7;
/// Days of future events fetched on every sync pass.
pub const SYNC_WINDOW_FUTURE_DAYS: i64 = 90;

/// Safety buffer subtracted from the token expiry when deciding whether an
/// OAuth2 access token needs a refresh.
pub const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// How far ahead the reminder engine scans on each pass.
pub const REMINDER_SCAN_HOURS: i64 = 24;
/// A reminder whose instant passed no longer than this ago still fires.
pub const REMINDER_GRACE_SECONDS: i64 = 300;

/// Upper bound on the scheduling loop's sleep between passes.
pub const POLL_CEILING_SECONDS: u64 = 600;
/// Lower bound on the scheduling loop's sleep between passes.
pub const POLL_FLOOR_SECONDS: u64 = 1;

/// Hard cap on expanded occurrences per recurring event.
pub const MAX_OCCURRENCES: u16 = 365;
