//! Calendar accounts and their credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// The closed set of supported calendar providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ical,
    Google,
    Icloud,
    Outlook,
    Caldav,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ical => "ical",
            ProviderKind::Google => "google",
            ProviderKind::Icloud => "icloud",
            ProviderKind::Outlook => "outlook",
            ProviderKind::Caldav => "caldav",
        }
    }

    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Ical,
        ProviderKind::Google,
        ProviderKind::Icloud,
        ProviderKind::Outlook,
        ProviderKind::Caldav,
    ];
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ical" => Ok(ProviderKind::Ical),
            "google" => Ok(ProviderKind::Google),
            "icloud" => Ok(ProviderKind::Icloud),
            "outlook" => Ok(ProviderKind::Outlook),
            "caldav" => Ok(ProviderKind::Caldav),
            other => Err(SyncError::Config(format!(
                "Unknown provider kind '{}'",
                other
            ))),
        }
    }
}

/// How an account authenticates against its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    None,
    Password,
    OAuth2,
}

/// OAuth2 token pair with its expiry instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Credential payload stored in the secret store, tagged to match
/// [`AuthKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Credentials {
    None,
    Password { username: String, password: String },
    OAuth2(OAuthTokens),
}

impl Credentials {
    pub fn auth_kind(&self) -> AuthKind {
        match self {
            Credentials::None => AuthKind::None,
            Credentials::Password { .. } => AuthKind::Password,
            Credentials::OAuth2(_) => AuthKind::OAuth2,
        }
    }
}

/// One calendar on the remote side of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCalendar {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub read_only: bool,
}

/// A configured calendar account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub provider: ProviderKind,
    pub display_name: String,
    /// Required for ical/caldav, optional for icloud (falls back to the
    /// provider default), unused for google/outlook.
    pub base_url: Option<String>,
    pub auth_kind: AuthKind,
    pub enabled: bool,
    pub calendars: Vec<AccountCalendar>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Email the account is registered under; used to resolve the owner's
    /// RSVP status from ICS ATTENDEE lines.
    pub email: Option<String>,
}

impl Account {
    pub fn new(user_id: &str, provider: ProviderKind, display_name: &str) -> Self {
        Account {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            provider,
            display_name: display_name.to_string(),
            base_url: None,
            auth_kind: AuthKind::None,
            enabled: true,
            calendars: Vec::new(),
            last_synced_at: None,
            last_error: None,
            last_error_at: None,
            email: None,
        }
    }

    /// The credential payload variant must always match the account's
    /// declared auth kind.
    pub fn credentials_match(&self, credentials: &Credentials) -> bool {
        credentials.auth_kind() == self.auth_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_round_trips_through_str() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn provider_kind_rejects_unknown_tag() {
        assert!("webdav".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn credentials_variant_matches_auth_kind() {
        let mut account = Account::new("user-1", ProviderKind::Caldav, "Home");
        account.auth_kind = AuthKind::Password;

        assert!(account.credentials_match(&Credentials::Password {
            username: "a".into(),
            password: "b".into(),
        }));
        assert!(!account.credentials_match(&Credentials::None));
    }
}
