//! Generic CalDAV adapter.
//!
//! Talks RFC 4791 over HTTP basic auth: calendars are discovered with a
//! Depth-1 PROPFIND on the calendar home, events are fetched with a
//! time-range `calendar-query` REPORT and parsed from the returned ICS
//! payloads, and writes are per-resource PUT/DELETE with ETag guards.
//! Also serves iCloud with a preset base URL (see [`crate::icloud`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use url::Url;

use calsync_core::ics::{generate_event_ics, parse_feed};
use calsync_core::{
    Account, Credentials, EventData, ProviderKind, SyncCursor, SyncError, SyncResult,
};

use crate::adapter::{ProviderAdapter, RemoteCalendar, RemoteDelta, SyncWindow};
use crate::http::{check_status, client, transport_error};

#[derive(Debug)]
pub struct CaldavAdapter {
    kind: ProviderKind,
    default_url: Option<&'static str>,
}

impl CaldavAdapter {
    pub fn new() -> Self {
        CaldavAdapter {
            kind: ProviderKind::Caldav,
            default_url: None,
        }
    }

    /// A CalDAV adapter registered under a different provider kind, with a
    /// preset server URL for accounts that don't carry one.
    pub fn with_defaults(kind: ProviderKind, default_url: &'static str) -> Self {
        CaldavAdapter {
            kind,
            default_url: Some(default_url),
        }
    }
}

impl Default for CaldavAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// A fetched calendar resource with its ICS payload.
#[derive(Debug, PartialEq)]
pub(crate) struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

// ============================================================================
// Request plumbing
// ============================================================================

fn dav_method(name: &str) -> SyncResult<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|_| SyncError::Provider(format!("Invalid HTTP method '{}'", name)))
}

fn basic_auth(credentials: &Credentials) -> SyncResult<(&str, &str)> {
    match credentials {
        Credentials::Password { username, password } => Ok((username, password)),
        _ => Err(SyncError::CredentialMismatch(
            "CalDAV accounts require username/password credentials".into(),
        )),
    }
}

/// Resolve an href path against the account's server URL.
fn resolve_href(base: &Url, href: &str) -> SyncResult<Url> {
    base.join(href)
        .map_err(|e| SyncError::Provider(format!("Invalid CalDAV href '{}': {}", href, e)))
}

/// Build the URL for an event resource inside a calendar collection.
fn event_url(base: &Url, calendar_href: &str, uid: &str) -> SyncResult<Url> {
    let collection = calendar_href.trim_end_matches('/');
    resolve_href(base, &format!("{}/{}.ics", collection, uid))
}

/// Format a UTC instant for CalDAV time-range queries (`YYYYMMDDTHHMMSSZ`).
fn format_caldav_datetime(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn calendar_query_body(window: SyncWindow) -> String {
    format!(
        r#"<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data/>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
        format_caldav_datetime(window.from),
        format_caldav_datetime(window.to)
    )
}

const CALENDAR_PROPFIND_BODY: &str = r#"<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" xmlns:a="http://apple.com/ns/ical/">
    <d:prop>
        <d:displayname/>
        <d:resourcetype/>
        <c:supported-calendar-component-set/>
        <a:calendar-color/>
    </d:prop>
</d:propfind>"#;

// ============================================================================
// Multistatus parsing
// ============================================================================

/// Parse calendar resources out of a `calendar-query` multistatus response.
pub(crate) fn parse_calendar_resources(body: &str) -> SyncResult<Vec<CalendarResource>> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| SyncError::Provider(format!("Invalid CalDAV multistatus: {}", e)))?;
    let root = doc.root_element();

    let mut resources = Vec::new();
    for response in root
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
    {
        let href = response
            .descendants()
            .find(|n| n.tag_name().name() == "href")
            .and_then(|n| n.text())
            .map(str::to_string);
        let Some(href) = href else { continue };

        let etag = response
            .descendants()
            .find(|n| n.tag_name().name() == "getetag")
            .and_then(|n| n.text())
            .map(str::to_string);

        // Resources without calendar-data (collections, tombstones) are
        // skipped.
        let data = response
            .descendants()
            .find(|n| n.tag_name().name() == "calendar-data")
            .and_then(|n| n.text())
            .map(str::to_string);
        if let Some(data) = data {
            resources.push(CalendarResource { href, etag, data });
        }
    }
    Ok(resources)
}

/// Parse calendar collections out of a PROPFIND multistatus response. Only
/// collections that are calendars supporting VEVENT are kept.
pub(crate) fn parse_calendar_collections(body: &str) -> SyncResult<Vec<RemoteCalendar>> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| SyncError::Provider(format!("Invalid CalDAV multistatus: {}", e)))?;
    let root = doc.root_element();

    let mut calendars = Vec::new();
    for response in root
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
    {
        let href = response
            .descendants()
            .find(|n| n.tag_name().name() == "href")
            .and_then(|n| n.text())
            .map(str::to_string);
        let Some(href) = href else { continue };

        let is_calendar = response
            .descendants()
            .filter(|n| n.tag_name().name() == "resourcetype")
            .any(|n| n.descendants().any(|c| c.tag_name().name() == "calendar"));
        if !is_calendar {
            continue;
        }

        let supports_vevent = response
            .descendants()
            .filter(|n| n.tag_name().name() == "supported-calendar-component-set")
            .flat_map(|n| n.descendants())
            .any(|n| n.tag_name().name() == "comp" && n.attribute("name") == Some("VEVENT"));
        if !supports_vevent {
            continue;
        }

        let name = response
            .descendants()
            .find(|n| n.tag_name().name() == "displayname")
            .and_then(|n| n.text())
            .map(str::to_string)
            .unwrap_or_else(|| href.clone());
        let color = response
            .descendants()
            .find(|n| n.tag_name().name() == "calendar-color")
            .and_then(|n| n.text())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        calendars.push(RemoteCalendar {
            id: href,
            name,
            color,
            read_only: false,
        });
    }
    Ok(calendars)
}

// ============================================================================
// Adapter
// ============================================================================

impl CaldavAdapter {
    fn base_url(&self, account: &Account) -> SyncResult<Url> {
        let raw = account
            .base_url
            .as_deref()
            .or(self.default_url)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "Account '{}' has no CalDAV server URL",
                    account.id
                ))
            })?;
        Url::parse(raw)
            .map_err(|e| SyncError::Config(format!("Invalid CalDAV server URL '{}': {}", raw, e)))
    }

    async fn propfind(&self, url: Url, credentials: &Credentials) -> SyncResult<String> {
        let (username, password) = basic_auth(credentials)?;
        let response = client()
            .request(dav_method("PROPFIND")?, url)
            .basic_auth(username, Some(password))
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(CALENDAR_PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| transport_error("CalDAV PROPFIND failed", e))?;
        let response = check_status(response, "CalDAV PROPFIND failed").await?;
        response
            .text()
            .await
            .map_err(|e| transport_error("Failed to read CalDAV PROPFIND response", e))
    }

    async fn calendar_query(
        &self,
        url: Url,
        credentials: &Credentials,
        window: SyncWindow,
    ) -> SyncResult<Vec<CalendarResource>> {
        let (username, password) = basic_auth(credentials)?;
        let response = client()
            .request(dav_method("REPORT")?, url)
            .basic_auth(username, Some(password))
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(calendar_query_body(window))
            .send()
            .await
            .map_err(|e| transport_error("CalDAV REPORT failed", e))?;
        let response = check_status(response, "CalDAV REPORT failed").await?;
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("Failed to read CalDAV REPORT response", e))?;
        parse_calendar_resources(&body)
    }

    /// The calendar hrefs a sync pass covers: the account's enabled
    /// calendars, or everything the server advertises when none are
    /// configured.
    async fn calendar_hrefs(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<Vec<String>> {
        let enabled: Vec<String> = account
            .calendars
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.id.clone())
            .collect();
        if !enabled.is_empty() {
            return Ok(enabled);
        }
        let discovered = self.list_calendars(account, credentials).await?;
        Ok(discovered.into_iter().map(|c| c.id).collect())
    }
}

#[async_trait]
impl ProviderAdapter for CaldavAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn supports_write(&self) -> bool {
        true
    }

    async fn test_connection(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<()> {
        let base = self.base_url(account)?;
        self.propfind(base, credentials).await?;
        Ok(())
    }

    async fn list_calendars(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<Vec<RemoteCalendar>> {
        let base = self.base_url(account)?;
        let body = self.propfind(base, credentials).await?;
        parse_calendar_collections(&body)
    }

    async fn sync_events(
        &self,
        account: &Account,
        credentials: &Credentials,
        window: SyncWindow,
        _cursor: &SyncCursor,
    ) -> SyncResult<RemoteDelta> {
        let base = self.base_url(account)?;
        // Reject mismatched credentials before any network round trip.
        basic_auth(credentials)?;

        let mut delta = RemoteDelta {
            full_sync: true,
            ..RemoteDelta::default()
        };

        for href in self.calendar_hrefs(account, credentials).await? {
            let url = resolve_href(&base, &href)?;
            let resources = match self.calendar_query(url, credentials, window).await {
                Ok(resources) => resources,
                Err(e) => {
                    tracing::warn!(
                        account = %account.id,
                        calendar = %href,
                        error = %e,
                        "skipping calendar for this sync pass"
                    );
                    continue;
                }
            };

            for resource in resources {
                let mut events =
                    match parse_feed(&resource.data, &href, window.from, window.to, account.email.as_deref()) {
                        Ok(events) => events,
                        Err(e) => {
                            tracing::warn!(
                                account = %account.id,
                                href = %resource.href,
                                error = %e,
                                "skipping unparseable calendar resource"
                            );
                            continue;
                        }
                    };
                for event in &mut events {
                    event.etag = resource.etag.clone();
                    event.raw = Some(resource.data.clone());
                }
                delta.events.append(&mut events);
            }
        }
        Ok(delta)
    }

    async fn create_event(
        &self,
        account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<EventData> {
        let base = self.base_url(account)?;
        let (username, password) = basic_auth(credentials)?;
        if data.calendar_id.is_empty() {
            return Err(SyncError::Config(
                "CalDAV event creation requires a calendar".into(),
            ));
        }
        let url = event_url(&base, &data.calendar_id, &data.uid)?;
        let ics = generate_event_ics(data)?;

        let response = client()
            .put(url)
            .basic_auth(username, Some(password))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .header("If-None-Match", "*")
            .body(ics.clone())
            .send()
            .await
            .map_err(|e| transport_error("CalDAV event create failed", e))?;
        let response = check_status(response, "CalDAV event create failed").await?;

        let mut created = data.clone();
        created.etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        created.raw = Some(ics);
        Ok(created)
    }

    async fn update_event(
        &self,
        account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<EventData> {
        let base = self.base_url(account)?;
        let (username, password) = basic_auth(credentials)?;
        let url = event_url(&base, &data.calendar_id, &data.uid)?;
        let ics = generate_event_ics(data)?;

        let mut request = client()
            .put(url)
            .basic_auth(username, Some(password))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(ics.clone());
        if let Some(ref etag) = data.etag {
            request = request.header("If-Match", etag.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("CalDAV event update failed", e))?;
        let response = check_status(response, "CalDAV event update failed").await?;

        let mut updated = data.clone();
        updated.etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        updated.raw = Some(ics);
        Ok(updated)
    }

    async fn delete_event(
        &self,
        account: &Account,
        credentials: &Credentials,
        data: &EventData,
    ) -> SyncResult<()> {
        let base = self.base_url(account)?;
        let (username, password) = basic_auth(credentials)?;
        let url = event_url(&base, &data.calendar_id, &data.uid)?;

        let mut request = client().delete(url).basic_auth(username, Some(password));
        if let Some(ref etag) = data.etag {
            request = request.header("If-Match", etag.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("CalDAV event delete failed", e))?;

        if response.status().as_u16() == 404 {
            return Ok(());
        }
        check_status(response, "CalDAV event delete failed").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MULTISTATUS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/calendars/user/home/event-1.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"etag-1"</d:getetag>
        <c:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:event-1
DTSTART:20250320T150000Z
DTEND:20250320T160000Z
SUMMARY:Review
END:VEVENT
END:VCALENDAR</c:calendar-data>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/calendars/user/home/</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"collection"</d:getetag>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    const PROPFIND_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" xmlns:a="http://apple.com/ns/ical/">
  <d:response>
    <d:href>/calendars/user/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/calendars/user/home/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Home</d:displayname>
        <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
        <c:supported-calendar-component-set>
          <c:comp name="VEVENT"/>
        </c:supported-calendar-component-set>
        <a:calendar-color>#B90E28FF</a:calendar-color>
      </d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/calendars/user/tasks/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Tasks</d:displayname>
        <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
        <c:supported-calendar-component-set>
          <c:comp name="VTODO"/>
        </c:supported-calendar-component-set>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn parses_resources_and_skips_entries_without_data() {
        let resources = parse_calendar_resources(MULTISTATUS).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].href, "/calendars/user/home/event-1.ics");
        assert_eq!(resources[0].etag.as_deref(), Some("\"etag-1\""));
        assert!(resources[0].data.contains("UID:event-1"));
    }

    #[test]
    fn propfind_keeps_only_vevent_calendars() {
        let calendars = parse_calendar_collections(PROPFIND_RESPONSE).unwrap();
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].id, "/calendars/user/home/");
        assert_eq!(calendars[0].name, "Home");
        assert_eq!(calendars[0].color.as_deref(), Some("#B90E28FF"));
    }

    #[test]
    fn formats_time_range_boundaries() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_caldav_datetime(at), "20250102T030405Z");
    }

    #[test]
    fn event_urls_nest_under_the_collection() {
        let base = Url::parse("https://caldav.example.com").unwrap();
        let url = event_url(&base, "/calendars/user/home/", "uid-1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://caldav.example.com/calendars/user/home/uid-1.ics"
        );
    }

    #[test]
    fn missing_server_url_is_a_config_error() {
        let account = Account::new("user-1", ProviderKind::Caldav, "Fastmail");
        let err = CaldavAdapter::new().base_url(&account).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn preset_url_fills_in_for_missing_base_url() {
        let adapter =
            CaldavAdapter::with_defaults(ProviderKind::Icloud, "https://caldav.icloud.com");
        let account = Account::new("user-1", ProviderKind::Icloud, "iCloud");
        let url = adapter.base_url(&account).unwrap();
        assert_eq!(url.as_str(), "https://caldav.icloud.com/");
    }
}
