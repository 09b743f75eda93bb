//! Google Calendar REST v3 adapter.
//!
//! Incremental sync uses Google's sync tokens: when a token is supplied the
//! adapter requests only the delta (the API ignores time ranges for token
//! requests) and turns `status=cancelled` items into tombstones. Without a
//! token it performs a full time-ranged fetch, capped at 2500 items per
//! calendar. A per-calendar fetch error (typically a stale token) skips
//! that calendar for the pass; the next full sync recovers it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use calsync_core::{
    base_uid, occurrence_uid, Account, Attendee, Credentials, EventData, ProviderKind,
    ResponseStatus, SyncCursor, SyncError, SyncResult,
};

use crate::adapter::{ProviderAdapter, RemoteCalendar, RemoteDelta, SyncWindow};
use crate::http::{check_status, client, transport_error};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
/// Full fetches are capped at this many items per calendar.
const MAX_RESULTS: u32 = 2500;

#[derive(Debug)]
pub struct GoogleAdapter;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CalendarListPage {
    #[serde(default)]
    items: Vec<CalendarListItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "backgroundColor")]
    background_color: Option<String>,
    #[serde(rename = "accessRole", default)]
    access_role: String,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GoogleEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "iCalUID")]
    ical_uid: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: String,
    start: Option<GoogleEventTime>,
    end: Option<GoogleEventTime>,
    #[serde(rename = "recurringEventId")]
    recurring_event_id: Option<String>,
    #[serde(default)]
    recurrence: Vec<String>,
    organizer: Option<GoogleActor>,
    #[serde(default)]
    attendees: Vec<GoogleAttendee>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventTime {
    date: Option<NaiveDate>,
    #[serde(rename = "dateTime")]
    date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GoogleActor {
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct GoogleAttendee {
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(default)]
    email: String,
    #[serde(rename = "responseStatus", default)]
    response_status: String,
    #[serde(rename = "self", default)]
    is_self: bool,
}

// ============================================================================
// Mapping
// ============================================================================

fn participation_status(s: &str) -> Option<ResponseStatus> {
    match s {
        "accepted" => Some(ResponseStatus::Accepted),
        "declined" => Some(ResponseStatus::Declined),
        "tentative" => Some(ResponseStatus::Tentative),
        "needsAction" => Some(ResponseStatus::NeedsAction),
        _ => None,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// The cache key for a Google item: its iCal UID, falling back to its id.
fn google_uid(item: &GoogleEvent) -> String {
    item.ical_uid.clone().unwrap_or_else(|| item.id.clone())
}

fn event_time(t: &GoogleEventTime) -> Option<(DateTime<Utc>, bool)> {
    if let Some(dt) = t.date_time {
        Some((dt, false))
    } else {
        t.date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| (dt.and_utc(), true))
    }
}

/// Convert a non-cancelled Google item to the normalized model. Items
/// without usable start/end times yield `None`.
pub(crate) fn event_from_google(item: GoogleEvent, calendar_id: &str) -> Option<EventData> {
    if item.id.is_empty() {
        return None;
    }
    let (start, all_day) = item.start.as_ref().and_then(event_time)?;
    let (end, _) = item.end.as_ref().and_then(event_time)?;

    // Expanded instances share the series iCal UID; synthesize a per-
    // occurrence uid so each instance stays addressable.
    let uid = if item.recurring_event_id.is_some() {
        occurrence_uid(&google_uid(&item), start)
    } else {
        google_uid(&item)
    };

    let response_status = item
        .attendees
        .iter()
        .find(|a| a.is_self)
        .and_then(|a| participation_status(&a.response_status));

    let organizer = item.organizer.as_ref().map(|o| Attendee {
        name: non_empty(o.display_name.clone()),
        email: o.email.clone(),
        response_status: None,
    });
    let attendees: Vec<Attendee> = item
        .attendees
        .iter()
        .map(|a| Attendee {
            name: non_empty(a.display_name.clone()),
            email: a.email.clone(),
            response_status: participation_status(&a.response_status),
        })
        .collect();

    let recurrence = item
        .recurrence
        .iter()
        .find_map(|line| line.strip_prefix("RRULE:").map(str::to_string));

    Some(EventData {
        calendar_id: calendar_id.to_string(),
        uid,
        title: if item.summary.is_empty() {
            "(No title)".to_string()
        } else {
            item.summary
        },
        description: non_empty(item.description),
        location: non_empty(item.location),
        start,
        end,
        all_day,
        recurrence,
        organizer,
        attendees,
        response_status,
        url: item.html_link,
        etag: item.etag,
        raw: None,
    })
}

/// Serialize the write-path body: all-day events as date-only fields,
/// timed events as datetimes with timezone metadata.
fn to_google_event(data: &EventData) -> Value {
    fn time_field(at: DateTime<Utc>, all_day: bool) -> Value {
        if all_day {
            json!({ "date": at.format("%Y-%m-%d").to_string() })
        } else {
            json!({ "dateTime": at.to_rfc3339(), "timeZone": "UTC" })
        }
    }

    let mut body = json!({
        "summary": data.title,
        "start": time_field(data.start, data.all_day),
        "end": time_field(data.end, data.all_day),
    });
    if let Some(ref desc) = data.description {
        body["description"] = json!(desc);
    }
    if let Some(ref loc) = data.location {
        body["location"] = json!(loc);
    }
    if let Some(ref rrule) = data.recurrence {
        body["recurrence"] = json!([format!("RRULE:{}", rrule)]);
    }
    body
}

// ============================================================================
// Adapter
// ============================================================================

impl GoogleAdapter {
    fn access_token(credentials: &Credentials) -> SyncResult<&str> {
        match credentials {
            Credentials::OAuth2(tokens) => Ok(&tokens.access_token),
            _ => Err(SyncError::CredentialMismatch(
                "Google accounts require OAuth2 credentials".into(),
            )),
        }
    }

    /// Calendar ids a sync pass covers: the account's enabled calendars,
    /// or the primary calendar when none are configured.
    fn calendar_ids(account: &Account) -> Vec<String> {
        let enabled: Vec<String> = account
            .calendars
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.id.clone())
            .collect();
        if enabled.is_empty() {
            vec!["primary".to_string()]
        } else {
            enabled
        }
    }

    async fn fetch_events_page(token: &str, url: &str) -> SyncResult<EventsPage> {
        let response = client()
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error("Google events request failed", e))?;
        let response = check_status(response, "Google events fetch failed").await?;
        response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse Google events response", e))
    }

    /// Fetch one calendar's events, either the token delta or a full
    /// time-ranged fetch.
    async fn fetch_calendar(
        token: &str,
        calendar_id: &str,
        window: SyncWindow,
        sync_token: Option<&str>,
    ) -> SyncResult<(Vec<GoogleEvent>, Option<String>)> {
        let encoded: String = url::form_urlencoded::byte_serialize(calendar_id.as_bytes()).collect();
        let base = format!("{}/calendars/{}/events", API_BASE, encoded);

        let mut items = Vec::new();
        let mut next_sync_token = None;
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}?singleEvents=true&maxResults={}", base, MAX_RESULTS);
            match sync_token {
                // Token fetches are time-range-agnostic by the API's design.
                Some(token) => {
                    url.push_str(&format!(
                        "&syncToken={}",
                        url::form_urlencoded::byte_serialize(token.as_bytes()).collect::<String>()
                    ));
                }
                None => {
                    url.push_str(&format!(
                        "&timeMin={}&timeMax={}",
                        window.from.to_rfc3339(),
                        window.to.to_rfc3339()
                    ));
                }
            }
            if let Some(ref page) = page_token {
                url.push_str(&format!(
                    "&pageToken={}",
                    url::form_urlencoded::byte_serialize(page.as_bytes()).collect::<String>()
                ));
            }

            let page = Self::fetch_events_page(token, &url).await?;
            items.extend(page.items);
            if page.next_sync_token.is_some() {
                next_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                // Full fetches are capped at one page per calendar.
                Some(next) if sync_token.is_some() => page_token = Some(next),
                _ => break,
            }
        }

        Ok((items, next_sync_token))
    }

    /// Look up the provider event id for a cached uid.
    async fn resolve_event_id(
        token: &str,
        calendar_id: &str,
        uid: &str,
    ) -> SyncResult<String> {
        let encoded: String = url::form_urlencoded::byte_serialize(calendar_id.as_bytes()).collect();
        let url = format!(
            "{}/calendars/{}/events?iCalUID={}&maxResults=1",
            API_BASE,
            encoded,
            url::form_urlencoded::byte_serialize(base_uid(uid).as_bytes()).collect::<String>()
        );
        let page = Self::fetch_events_page(token, &url).await?;
        page.items
            .into_iter()
            .next()
            .filter(|item| !item.id.is_empty())
            .map(|item| item.id)
            .ok_or_else(|| {
                SyncError::Provider(format!("No Google event found for uid '{}'", uid))
            })
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn supports_write(&self) -> bool {
        true
    }

    async fn test_connection(
        &self,
        _account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<()> {
        let token = Self::access_token(credentials)?;
        let url = format!("{}/users/me/calendarList?maxResults=1", API_BASE);
        let response = client()
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error("Google connection test failed", e))?;
        check_status(response, "Google connection test failed").await?;
        Ok(())
    }

    async fn list_calendars(
        &self,
        _account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<Vec<RemoteCalendar>> {
        let token = Self::access_token(credentials)?;

        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!("{}/users/me/calendarList?maxResults=250", API_BASE);
            if let Some(ref page) = page_token {
                url.push_str(&format!("&pageToken={}", page));
            }
            let response = client()
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| transport_error("Google calendar list request failed", e))?;
            let response = check_status(response, "Google calendar list failed").await?;
            let page: CalendarListPage = response
                .json()
                .await
                .map_err(|e| transport_error("Failed to parse Google calendar list", e))?;

            calendars.extend(page.items.into_iter().filter(|c| !c.id.is_empty()).map(|c| {
                RemoteCalendar {
                    id: c.id,
                    name: if c.summary.is_empty() {
                        "(unnamed)".to_string()
                    } else {
                        c.summary
                    },
                    color: c.background_color,
                    read_only: !matches!(c.access_role.as_str(), "owner" | "writer"),
                }
            }));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(calendars)
    }

    async fn sync_events(
        &self,
        account: &Account,
        credentials: &Credentials,
        window: SyncWindow,
        cursor: &SyncCursor,
    ) -> SyncResult<RemoteDelta> {
        let token = Self::access_token(credentials)?;
        let sync_token = cursor.sync_token.as_deref();

        let mut delta = RemoteDelta {
            full_sync: sync_token.is_none(),
            ..RemoteDelta::default()
        };

        for calendar_id in Self::calendar_ids(account) {
            let fetched =
                Self::fetch_calendar(token, &calendar_id, window, sync_token).await;
            let (items, next_sync_token) = match fetched {
                Ok(result) => result,
                // Typically a stale sync token (HTTP 410); skip the calendar
                // for this pass, the next tokenless sync recovers it.
                Err(e) => {
                    tracing::warn!(
                        account = %account.id,
                        calendar = %calendar_id,
                        error = %e,
                        "skipping calendar for this sync pass"
                    );
                    continue;
                }
            };

            for item in items {
                if item.status == "cancelled" {
                    delta.deleted_uids.push(google_uid(&item));
                } else if let Some(event) = event_from_google(item, &calendar_id) {
                    delta.events.push(event);
                }
            }
            if next_sync_token.is_some() {
                delta.sync_token = next_sync_token;
            }
        }
        Ok(delta)
    }

    async fn create_event(
        &self,
        _account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<EventData> {
        let token = Self::access_token(credentials)?;
        let calendar_id = if data.calendar_id.is_empty() {
            "primary"
        } else {
            &data.calendar_id
        };
        let encoded: String = url::form_urlencoded::byte_serialize(calendar_id.as_bytes()).collect();
        let url = format!("{}/calendars/{}/events", API_BASE, encoded);

        let response = client()
            .post(&url)
            .bearer_auth(token)
            .json(&to_google_event(data))
            .send()
            .await
            .map_err(|e| transport_error("Google event create failed", e))?;
        let response = check_status(response, "Google event create failed").await?;
        let created: GoogleEvent = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse created Google event", e))?;

        event_from_google(created, calendar_id).ok_or_else(|| {
            SyncError::Provider("Google returned an event without usable times".into())
        })
    }

    async fn update_event(
        &self,
        _account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<EventData> {
        let token = Self::access_token(credentials)?;
        let event_id = Self::resolve_event_id(token, &data.calendar_id, &data.uid).await?;
        let encoded: String =
            url::form_urlencoded::byte_serialize(data.calendar_id.as_bytes()).collect();
        let url = format!("{}/calendars/{}/events/{}", API_BASE, encoded, event_id);

        let response = client()
            .put(&url)
            .bearer_auth(token)
            .json(&to_google_event(data))
            .send()
            .await
            .map_err(|e| transport_error("Google event update failed", e))?;
        let response = check_status(response, "Google event update failed").await?;
        let updated: GoogleEvent = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse updated Google event", e))?;

        event_from_google(updated, &data.calendar_id).ok_or_else(|| {
            SyncError::Provider("Google returned an event without usable times".into())
        })
    }

    async fn delete_event(
        &self,
        _account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<()> {
        let token = Self::access_token(credentials)?;
        let event_id = Self::resolve_event_id(token, &data.calendar_id, &data.uid).await?;
        let encoded: String =
            url::form_urlencoded::byte_serialize(data.calendar_id.as_bytes()).collect();
        let url = format!("{}/calendars/{}/events/{}", API_BASE, encoded, event_id);

        let response = client()
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error("Google event delete failed", e))?;

        // Already-deleted events report 410 Gone; treat that as success.
        let status = response.status().as_u16();
        if status == 410 || status == 404 {
            return Ok(());
        }
        check_status(response, "Google event delete failed").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn timed_item(json: Value) -> GoogleEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn maps_timed_event_with_self_rsvp() {
        let item = timed_item(json!({
            "id": "abc123",
            "iCalUID": "abc123@google.com",
            "status": "confirmed",
            "summary": "Design review",
            "location": "Room 2",
            "start": { "dateTime": "2025-03-20T15:00:00Z" },
            "end": { "dateTime": "2025-03-20T16:00:00Z" },
            "attendees": [
                { "email": "me@example.com", "responseStatus": "tentative", "self": true },
                { "email": "peer@example.com", "responseStatus": "accepted" }
            ],
            "htmlLink": "https://calendar.google.com/event?eid=abc"
        }));

        let event = event_from_google(item, "primary").unwrap();
        assert_eq!(event.uid, "abc123@google.com");
        assert_eq!(event.title, "Design review");
        assert!(!event.all_day);
        assert_eq!(
            event.start,
            Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap()
        );
        assert_eq!(event.response_status, Some(ResponseStatus::Tentative));
        assert_eq!(event.attendees.len(), 2);
    }

    #[test]
    fn maps_all_day_event_from_date_fields() {
        let item = timed_item(json!({
            "id": "allday1",
            "summary": "Offsite",
            "start": { "date": "2025-04-01" },
            "end": { "date": "2025-04-02" }
        }));

        let event = event_from_google(item, "primary").unwrap();
        assert!(event.all_day);
        assert_eq!(event.uid, "allday1");
        assert_eq!(
            event.start,
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn recurrence_instances_get_synthesized_uids() {
        let item = timed_item(json!({
            "id": "inst1",
            "iCalUID": "series@google.com",
            "recurringEventId": "series-id",
            "summary": "Weekly",
            "start": { "dateTime": "2025-03-24T09:00:00Z" },
            "end": { "dateTime": "2025-03-24T09:30:00Z" }
        }));

        let event = event_from_google(item, "primary").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 24, 9, 0, 0).unwrap();
        assert_eq!(event.uid, occurrence_uid("series@google.com", start));
    }

    #[test]
    fn tombstone_uid_prefers_ical_uid() {
        let cancelled = timed_item(json!({
            "id": "gone1",
            "iCalUID": "gone1@google.com",
            "status": "cancelled"
        }));
        assert_eq!(google_uid(&cancelled), "gone1@google.com");

        let bare = timed_item(json!({ "id": "gone2", "status": "cancelled" }));
        assert_eq!(google_uid(&bare), "gone2");
    }

    #[test]
    fn write_body_serializes_dates_by_all_day_flag() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let mut data = EventData::new("primary", "uid", "Trip", start, start + Duration::days(2));
        data.all_day = true;

        let body = to_google_event(&data);
        assert_eq!(body["start"]["date"], "2025-05-01");
        assert!(body["start"].get("dateTime").is_none());

        data.all_day = false;
        let body = to_google_event(&data);
        assert_eq!(body["start"]["timeZone"], "UTC");
        assert!(body["start"].get("date").is_none());
    }

    #[test]
    fn oauth_credentials_are_required() {
        assert!(matches!(
            GoogleAdapter::access_token(&Credentials::None),
            Err(SyncError::CredentialMismatch(_))
        ));
    }
}
