//! Provider-neutral event types.
//!
//! Providers convert their API responses into these types; the cache, the
//! orchestrator and the reminder engine work exclusively with them. All
//! instants are normalized to UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// RSVP status of the account owner for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
}

impl ResponseStatus {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            ResponseStatus::Accepted => "ACCEPTED",
            ResponseStatus::Declined => "DECLINED",
            ResponseStatus::Tentative => "TENTATIVE",
            ResponseStatus::NeedsAction => "NEEDS-ACTION",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s {
            "ACCEPTED" => Some(ResponseStatus::Accepted),
            "DECLINED" => Some(ResponseStatus::Declined),
            "TENTATIVE" => Some(ResponseStatus::Tentative),
            "NEEDS-ACTION" => Some(ResponseStatus::NeedsAction),
            _ => None,
        }
    }
}

/// An event attendee (also used for the organizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
    pub response_status: Option<ResponseStatus>,
}

/// The provider-visible fields of an event, as returned by adapters.
///
/// `uid` is the provider-stable identifier and the sole reconciliation key:
/// `(account_id, uid)` is unique in the cache. Expanded recurrence
/// occurrences carry a synthesized uid (see [`occurrence_uid`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub calendar_id: String,
    pub uid: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    /// Opaque RRULE string; occurrences of a series keep the master's rule.
    pub recurrence: Option<String>,
    pub organizer: Option<Attendee>,
    pub attendees: Vec<Attendee>,
    /// RSVP status of the owning user, when the provider exposes it.
    pub response_status: Option<ResponseStatus>,
    pub url: Option<String>,
    /// ETag for conditional writes (CalDAV).
    pub etag: Option<String>,
    /// Raw provider-native payload, kept for CalDAV round-trips.
    pub raw: Option<String>,
}

impl EventData {
    /// Minimal constructor; optional fields default to empty.
    pub fn new(
        calendar_id: &str,
        uid: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        EventData {
            calendar_id: calendar_id.to_string(),
            uid: uid.to_string(),
            title: title.to_string(),
            description: None,
            location: None,
            start,
            end,
            all_day: false,
            recurrence: None,
            organizer: None,
            attendees: Vec::new(),
            response_status: None,
            url: None,
            etag: None,
            raw: None,
        }
    }

    /// True when the range `[from, to]` overlaps this event
    /// (`end >= from && start <= to`).
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.end >= from && self.start <= to
    }
}

/// A locally cached event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEvent {
    pub id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: EventData,
}

/// Synthesize the uid for one occurrence of a recurring event, keeping each
/// occurrence addressable in the cache.
pub fn occurrence_uid(base_uid: &str, start: DateTime<Utc>) -> String {
    format!("{}_{}", base_uid, start.to_rfc3339())
}

/// Strip an occurrence suffix back off a uid. Returns the input unchanged
/// for non-occurrence uids.
pub fn base_uid(uid: &str) -> &str {
    match uid.rsplit_once('_') {
        Some((base, suffix)) if DateTime::parse_from_rfc3339(suffix).is_ok() => base,
        _ => uid,
    }
}
