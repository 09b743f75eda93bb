//! Read-only iCal feed adapter.
//!
//! The whole feed text is refetched and reparsed on every sync; there is no
//! incremental cursor, so every pass is a full sync.

use async_trait::async_trait;

use calsync_core::ics::parse_feed;
use calsync_core::{
    Account, Credentials, EventData, ProviderKind, SyncCursor, SyncError, SyncResult,
};

use crate::adapter::{read_only_error, ProviderAdapter, RemoteCalendar, RemoteDelta, SyncWindow};
use crate::http::{check_status, client, transport_error};

/// The single pseudo-calendar a feed exposes.
pub const FEED_CALENDAR_ID: &str = "feed";

#[derive(Debug)]
pub struct IcalAdapter;

impl IcalAdapter {
    fn feed_url(account: &Account) -> SyncResult<String> {
        let url = account.base_url.as_deref().ok_or_else(|| {
            SyncError::Config(format!(
                "iCal account '{}' has no feed URL configured",
                account.display_name
            ))
        })?;
        Ok(normalize_feed_url(url))
    }

    async fn fetch_feed(account: &Account, credentials: &Credentials) -> SyncResult<String> {
        let url = Self::feed_url(account)?;

        let mut request = client().get(&url);
        match credentials {
            Credentials::None => {}
            Credentials::Password { username, password } => {
                request = request.basic_auth(username, Some(password));
            }
            Credentials::OAuth2(_) => {
                return Err(SyncError::CredentialMismatch(
                    "iCal feeds take no or basic credentials, not OAuth2".into(),
                ));
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error("Failed to fetch iCal feed", e))?;
        let response = check_status(response, "Feed fetch failed").await?;
        response
            .text()
            .await
            .map_err(|e| transport_error("Failed to read iCal feed body", e))
    }
}

/// Subscription links commonly use the webcal scheme; it is plain HTTPS.
fn normalize_feed_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("webcals://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("webcal://") {
        format!("https://{}", rest)
    } else {
        url.to_string()
    }
}

#[async_trait]
impl ProviderAdapter for IcalAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ical
    }

    fn supports_write(&self) -> bool {
        false
    }

    async fn test_connection(
        &self,
        account: &Account,
        credentials: &Credentials,
    ) -> SyncResult<()> {
        let text = Self::fetch_feed(account, credentials).await?;
        if !text.contains("BEGIN:VCALENDAR") {
            return Err(SyncError::IcsParse(
                "Feed response is not an iCalendar document".into(),
            ));
        }
        Ok(())
    }

    async fn list_calendars(
        &self,
        account: &Account,
        _credentials: &Credentials,
    ) -> SyncResult<Vec<RemoteCalendar>> {
        Ok(vec![RemoteCalendar {
            id: FEED_CALENDAR_ID.to_string(),
            name: account.display_name.clone(),
            color: None,
            read_only: true,
        }])
    }

    async fn sync_events(
        &self,
        account: &Account,
        credentials: &Credentials,
        window: SyncWindow,
        _cursor: &SyncCursor,
    ) -> SyncResult<RemoteDelta> {
        let text = Self::fetch_feed(account, credentials).await?;
        let events = parse_feed(
            &text,
            FEED_CALENDAR_ID,
            window.from,
            window.to,
            account.email.as_deref(),
        )?;

        Ok(RemoteDelta {
            events,
            full_sync: true,
            ..RemoteDelta::default()
        })
    }

    async fn create_event(
        &self,
        _account: &Account,
        _credentials: &Credentials,
        _data: &EventData,
    ) -> SyncResult<EventData> {
        Err(read_only_error(self.kind()))
    }

    async fn update_event(
        &self,
        _account: &Account,
        _credentials: &Credentials,
        _data: &EventData,
    ) -> SyncResult<EventData> {
        Err(read_only_error(self.kind()))
    }

    async fn delete_event(
        &self,
        _account: &Account,
        _credentials: &Credentials,
        _data: &EventData,
    ) -> SyncResult<()> {
        Err(read_only_error(self.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webcal_urls_are_normalized_to_https() {
        assert_eq!(
            normalize_feed_url("webcal://example.com/cal.ics"),
            "https://example.com/cal.ics"
        );
        assert_eq!(
            normalize_feed_url("webcals://example.com/cal.ics"),
            "https://example.com/cal.ics"
        );
        assert_eq!(
            normalize_feed_url("https://example.com/cal.ics"),
            "https://example.com/cal.ics"
        );
    }

    #[tokio::test]
    async fn writes_fail_with_read_only_error() {
        let adapter = IcalAdapter;
        let account = Account::new("user-1", ProviderKind::Ical, "Feed");
        let now = chrono::Utc::now();
        let data = EventData::new(FEED_CALENDAR_ID, "uid", "Event", now, now);

        let err = adapter
            .create_event(&account, &Credentials::None, &data)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ReadOnly(_)));
    }

    #[tokio::test]
    async fn missing_feed_url_is_a_config_error() {
        let adapter = IcalAdapter;
        let account = Account::new("user-1", ProviderKind::Ical, "Feed");
        let err = adapter
            .sync_events(
                &account,
                &Credentials::None,
                SyncWindow::around(chrono::Utc::now()),
                &SyncCursor::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
