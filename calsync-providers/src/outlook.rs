//! Outlook adapter over the Microsoft Graph API.
//!
//! Every sync pass is a full time-ranged `calendarView` fetch, paged via
//! `@odata.nextLink`. Graph's delta endpoint hands back a `deltaLink` which
//! the cursor records for a future incremental mode, but the adapter never
//! consumes it. Event bodies arrive as HTML and are flattened to plain text.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use calsync_core::{
    base_uid, occurrence_uid, Account, Attendee, Credentials, EventData, ProviderKind,
    ResponseStatus, SyncCursor, SyncError, SyncResult,
};

use crate::adapter::{ProviderAdapter, RemoteCalendar, RemoteDelta, SyncWindow};
use crate::http::{check_status, client, transport_error};

const API_BASE: &str = "https://graph.microsoft.com/v1.0";
const PAGE_SIZE: u32 = 500;
/// Graph returns `dateTime` without an offset; the `Prefer` header pins the
/// values to UTC so this format is unambiguous.
const GRAPH_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug)]
pub struct OutlookAdapter;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CalendarsPage {
    #[serde(default)]
    value: Vec<GraphCalendar>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphCalendar {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "hexColor")]
    hex_color: Option<String>,
    #[serde(rename = "canEdit", default)]
    can_edit: bool,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "iCalUId")]
    ical_uid: Option<String>,
    #[serde(default)]
    subject: String,
    body: Option<GraphBody>,
    location: Option<GraphLocation>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default)]
    is_cancelled: bool,
    #[serde(rename = "type", default)]
    event_type: String,
    series_master_id: Option<String>,
    organizer: Option<GraphOrganizer>,
    #[serde(default)]
    attendees: Vec<GraphAttendee>,
    response_status: Option<GraphResponse>,
    web_link: Option<String>,
    #[serde(rename = "@odata.etag")]
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphBody {
    #[serde(rename = "contentType", default)]
    content_type: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct GraphLocation {
    #[serde(rename = "displayName", default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct GraphDateTime {
    #[serde(rename = "dateTime", default)]
    date_time: String,
}

#[derive(Debug, Deserialize)]
struct GraphOrganizer {
    #[serde(rename = "emailAddress")]
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct GraphAttendee {
    #[serde(rename = "emailAddress")]
    email_address: Option<GraphEmailAddress>,
    status: Option<GraphResponse>,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    response: String,
}

// ============================================================================
// Mapping
// ============================================================================

/// Graph's response values are richer than the normalized set; organizer
/// and notResponded both fold into sensible statuses.
fn map_response(response: &str) -> Option<ResponseStatus> {
    match response {
        "accepted" | "organizer" => Some(ResponseStatus::Accepted),
        "declined" => Some(ResponseStatus::Declined),
        "tentativelyAccepted" => Some(ResponseStatus::Tentative),
        "notResponded" => Some(ResponseStatus::NeedsAction),
        _ => None,
    }
}

fn parse_graph_datetime(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, GRAPH_DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn graph_uid(item: &GraphEvent) -> String {
    item.ical_uid.clone().unwrap_or_else(|| item.id.clone())
}

/// Flatten an HTML body to readable plain text; text bodies pass through.
fn body_text(body: &GraphBody) -> Option<String> {
    let text = if body.content_type.eq_ignore_ascii_case("html") {
        html2text::from_read(body.content.as_bytes(), 80).unwrap_or_default()
    } else {
        body.content.clone()
    };
    non_empty(text.trim().to_string())
}

pub(crate) fn event_from_graph(item: GraphEvent, calendar_id: &str) -> Option<EventData> {
    if item.id.is_empty() {
        return None;
    }
    let start = item
        .start
        .as_ref()
        .and_then(|t| parse_graph_datetime(&t.date_time))?;
    let end = item
        .end
        .as_ref()
        .and_then(|t| parse_graph_datetime(&t.date_time))?;

    // calendarView expands series into occurrences sharing the master's
    // iCal UID, so occurrences need a synthesized per-instance uid.
    let uid = if item.event_type == "occurrence" || item.series_master_id.is_some() {
        occurrence_uid(&graph_uid(&item), start)
    } else {
        graph_uid(&item)
    };

    let organizer = item
        .organizer
        .as_ref()
        .and_then(|o| o.email_address.as_ref())
        .map(|addr| Attendee {
            name: non_empty(addr.name.clone()),
            email: addr.address.clone(),
            response_status: None,
        });
    let attendees: Vec<Attendee> = item
        .attendees
        .iter()
        .filter_map(|a| {
            let addr = a.email_address.as_ref()?;
            Some(Attendee {
                name: non_empty(addr.name.clone()),
                email: addr.address.clone(),
                response_status: a.status.as_ref().and_then(|s| map_response(&s.response)),
            })
        })
        .collect();

    Some(EventData {
        calendar_id: calendar_id.to_string(),
        uid,
        title: if item.subject.is_empty() {
            "(No title)".to_string()
        } else {
            item.subject
        },
        description: item.body.as_ref().and_then(body_text),
        location: item
            .location
            .as_ref()
            .and_then(|l| non_empty(l.display_name.clone())),
        start,
        end,
        all_day: item.is_all_day,
        recurrence: None,
        organizer,
        attendees,
        response_status: item
            .response_status
            .as_ref()
            .and_then(|s| map_response(&s.response)),
        url: item.web_link,
        etag: item.etag,
        raw: None,
    })
}

fn to_graph_event(data: &EventData) -> Value {
    let format = |at: DateTime<Utc>| at.format("%Y-%m-%dT%H:%M:%S").to_string();
    let mut body = json!({
        "subject": data.title,
        "start": { "dateTime": format(data.start), "timeZone": "UTC" },
        "end": { "dateTime": format(data.end), "timeZone": "UTC" },
        "isAllDay": data.all_day,
    });
    if let Some(ref desc) = data.description {
        body["body"] = json!({ "contentType": "text", "content": desc });
    }
    if let Some(ref loc) = data.location {
        body["location"] = json!({ "displayName": loc });
    }
    body
}

// ============================================================================
// Adapter
// ============================================================================

impl OutlookAdapter {
    fn access_token(credentials: &Credentials) -> SyncResult<&str> {
        match credentials {
            Credentials::OAuth2(tokens) => Ok(&tokens.access_token),
            _ => Err(SyncError::CredentialMismatch(
                "Outlook accounts require OAuth2 credentials".into(),
            )),
        }
    }

    fn calendar_ids(account: &Account) -> Vec<Option<String>> {
        let enabled: Vec<Option<String>> = account
            .calendars
            .iter()
            .filter(|c| c.enabled)
            .map(|c| Some(c.id.clone()))
            .collect();
        if enabled.is_empty() {
            // None selects the default calendar's view.
            vec![None]
        } else {
            enabled
        }
    }

    fn calendar_view_url(calendar_id: Option<&str>, window: SyncWindow) -> String {
        let prefix = match calendar_id {
            Some(id) => format!("{}/me/calendars/{}", API_BASE, id),
            None => format!("{}/me", API_BASE),
        };
        format!(
            "{}/calendarView?startDateTime={}&endDateTime={}&$top={}",
            prefix,
            window.from.to_rfc3339(),
            window.to.to_rfc3339(),
            PAGE_SIZE
        )
    }

    async fn fetch_page(token: &str, url: &str) -> SyncResult<EventsPage> {
        let response = client()
            .get(url)
            .bearer_auth(token)
            .header("Prefer", "outlook.timezone=\"UTC\"")
            .send()
            .await
            .map_err(|e| transport_error("Outlook events request failed", e))?;
        let response = check_status(response, "Outlook events fetch failed").await?;
        response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse Outlook events response", e))
    }

    /// Look up the provider event id for a cached uid.
    async fn resolve_event_id(token: &str, uid: &str) -> SyncResult<String> {
        let filter: String = url::form_urlencoded::byte_serialize(
            format!("iCalUId eq '{}'", base_uid(uid).replace('\'', "''")).as_bytes(),
        )
        .collect();
        let url = format!("{}/me/events?$filter={}&$top=1", API_BASE, filter);
        let page = Self::fetch_page(token, &url).await?;
        page.value
            .into_iter()
            .next()
            .filter(|item| !item.id.is_empty())
            .map(|item| item.id)
            .ok_or_else(|| {
                SyncError::Provider(format!("No Outlook event found for uid '{}'", uid))
            })
    }
}

#[async_trait]
impl ProviderAdapter for OutlookAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Outlook
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
        let url = format!("{}/me/calendars?$top=1", API_BASE);
        let response = client()
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error("Outlook connection test failed", e))?;
        check_status(response, "Outlook connection test failed").await?;
        Ok(())
    }

    async fn list_calendars(
        &self,
        _account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<Vec<RemoteCalendar>> {
        let token = Self::access_token(credentials)?;

        let mut calendars = Vec::new();
        let mut url = format!("{}/me/calendars?$top=100", API_BASE);
        loop {
            let response = client()
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| transport_error("Outlook calendar list request failed", e))?;
            let response = check_status(response, "Outlook calendar list failed").await?;
            let page: CalendarsPage = response
                .json()
                .await
                .map_err(|e| transport_error("Failed to parse Outlook calendar list", e))?;

            calendars.extend(page.value.into_iter().filter(|c| !c.id.is_empty()).map(|c| {
                RemoteCalendar {
                    id: c.id,
                    name: if c.name.is_empty() {
                        "(unnamed)".to_string()
                    } else {
                        c.name
                    },
                    color: c.hex_color.filter(|hex| !hex.is_empty()),
                    read_only: !c.can_edit,
                }
            }));
            match page.next_link {
                Some(next) => url = next,
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
        _cursor: &SyncCursor,
    ) -> SyncResult<RemoteDelta> {
        let token = Self::access_token(credentials)?;

        let mut delta = RemoteDelta {
            full_sync: true,
            ..RemoteDelta::default()
        };

        for calendar_id in Self::calendar_ids(account) {
            let mut url = Self::calendar_view_url(calendar_id.as_deref(), window);
            let label = calendar_id.clone().unwrap_or_else(|| "default".to_string());
            loop {
                let page = match Self::fetch_page(token, &url).await {
                    Ok(page) => page,
                    Err(e) => {
                        tracing::warn!(
                            account = %account.id,
                            calendar = %label,
                            error = %e,
                            "skipping calendar for this sync pass"
                        );
                        break;
                    }
                };

                for item in page.value {
                    if item.is_cancelled {
                        delta.deleted_uids.push(graph_uid(&item));
                    } else if let Some(event) = event_from_graph(item, &label) {
                        delta.events.push(event);
                    }
                }
                if page.delta_link.is_some() {
                    delta.delta_link = page.delta_link;
                }
                match page.next_link {
                    Some(next) => url = next,
                    None => break,
                }
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
        let url = if data.calendar_id.is_empty() || data.calendar_id == "default" {
            format!("{}/me/events", API_BASE)
        } else {
            format!("{}/me/calendars/{}/events", API_BASE, data.calendar_id)
        };

        let response = client()
            .post(&url)
            .bearer_auth(token)
            .json(&to_graph_event(data))
            .send()
            .await
            .map_err(|e| transport_error("Outlook event create failed", e))?;
        let response = check_status(response, "Outlook event create failed").await?;
        let created: GraphEvent = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse created Outlook event", e))?;

        event_from_graph(created, &data.calendar_id).ok_or_else(|| {
            SyncError::Provider("Outlook returned an event without usable times".into())
        })
    }

    async fn update_event(
        &self,
        _account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<EventData> {
        let token = Self::access_token(credentials)?;
        let event_id = Self::resolve_event_id(token, &data.uid).await?;
        let url = format!("{}/me/events/{}", API_BASE, event_id);

        let response = client()
            .patch(&url)
            .bearer_auth(token)
            .json(&to_graph_event(data))
            .send()
            .await
            .map_err(|e| transport_error("Outlook event update failed", e))?;
        let response = check_status(response, "Outlook event update failed").await?;
        let updated: GraphEvent = response
            .json()
            .await
            .map_err(|e| transport_error("Failed to parse updated Outlook event", e))?;

        event_from_graph(updated, &data.calendar_id).ok_or_else(|| {
            SyncError::Provider("Outlook returned an event without usable times".into())
        })
    }

    async fn delete_event(
        &self,
        _account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<()> {
        let token = Self::access_token(credentials)?;
        let event_id = Self::resolve_event_id(token, &data.uid).await?;
        let url = format!("{}/me/events/{}", API_BASE, event_id);

        let response = client()
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error("Outlook event delete failed", e))?;

        if response.status().as_u16() == 404 {
            return Ok(());
        }
        check_status(response, "Outlook event delete failed").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn graph_item(json: Value) -> GraphEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn parses_graph_datetimes_with_and_without_fraction() {
        assert_eq!(
            parse_graph_datetime("2025-03-20T15:00:00.0000000"),
            Some(Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap())
        );
        assert_eq!(
            parse_graph_datetime("2025-03-20T15:00:00"),
            Some(Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap())
        );
        assert_eq!(parse_graph_datetime("not a date"), None);
    }

    #[test]
    fn maps_singleton_event_with_html_body() {
        let item = graph_item(json!({
            "id": "AAMk1",
            "iCalUId": "040000008200E00074C5B7101A82E008",
            "subject": "Quarterly planning",
            "body": { "contentType": "html", "content": "<p>Bring <b>slides</b></p>" },
            "location": { "displayName": "Room 4" },
            "start": { "dateTime": "2025-03-20T15:00:00.0000000", "timeZone": "UTC" },
            "end": { "dateTime": "2025-03-20T16:00:00.0000000", "timeZone": "UTC" },
            "type": "singleInstance",
            "responseStatus": { "response": "accepted" },
            "webLink": "https://outlook.office.com/calendar/item/AAMk1"
        }));

        let event = event_from_graph(item, "default").unwrap();
        assert_eq!(event.uid, "040000008200E00074C5B7101A82E008");
        assert_eq!(event.title, "Quarterly planning");
        assert_eq!(event.description.as_deref(), Some("Bring **slides**"));
        assert_eq!(event.location.as_deref(), Some("Room 4"));
        assert_eq!(event.response_status, Some(ResponseStatus::Accepted));
        assert!(!event.all_day);
    }

    #[test]
    fn occurrences_get_synthesized_uids() {
        let item = graph_item(json!({
            "id": "AAMk2",
            "iCalUId": "series-uid",
            "subject": "Standup",
            "type": "occurrence",
            "seriesMasterId": "AAMkMaster",
            "start": { "dateTime": "2025-03-24T09:00:00.0000000", "timeZone": "UTC" },
            "end": { "dateTime": "2025-03-24T09:15:00.0000000", "timeZone": "UTC" }
        }));

        let event = event_from_graph(item, "default").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 24, 9, 0, 0).unwrap();
        assert_eq!(event.uid, occurrence_uid("series-uid", start));
    }

    #[test]
    fn organizer_response_maps_to_accepted() {
        assert_eq!(map_response("organizer"), Some(ResponseStatus::Accepted));
        assert_eq!(
            map_response("tentativelyAccepted"),
            Some(ResponseStatus::Tentative)
        );
        assert_eq!(map_response("none"), None);
    }

    #[test]
    fn write_body_uses_utc_datetimes() {
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        let data = EventData::new("default", "uid", "Sync call", start, end);

        let body = to_graph_event(&data);
        assert_eq!(body["start"]["dateTime"], "2025-05-01T09:00:00");
        assert_eq!(body["start"]["timeZone"], "UTC");
        assert_eq!(body["isAllDay"], false);
    }

    #[test]
    fn password_credentials_are_rejected() {
        let creds = Credentials::Password {
            username: "user".into(),
            password: "pass".into(),
        };
        assert!(matches!(
            OutlookAdapter::access_token(&creds),
            Err(SyncError::CredentialMismatch(_))
        ));
    }
}
