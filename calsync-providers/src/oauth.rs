//! OAuth2 refresh-token grants against the provider token endpoints.

use chrono::{Duration, Utc};
use serde::Deserialize;

use calsync_core::config::OAuthClientConfig;
use calsync_core::{OAuthTokens, ProviderKind, SyncError, SyncResult};

use crate::http::{check_status, client, transport_error};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const MICROSOFT_TOKEN_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Token endpoint for an OAuth2-capable provider.
pub fn token_url(kind: ProviderKind) -> SyncResult<&'static str> {
    match kind {
        ProviderKind::Google => Ok(GOOGLE_TOKEN_URL),
        ProviderKind::Outlook => Ok(MICROSOFT_TOKEN_URL),
        other => Err(SyncError::UnsupportedOAuthProvider(other.to_string())),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchange a refresh token for a new access token.
///
/// Providers typically do not return a new refresh token on refresh; the
/// old one is kept in that case.
pub async fn refresh_access_token(
    kind: ProviderKind,
    config: &OAuthClientConfig,
    tokens: &OAuthTokens,
) -> SyncResult<OAuthTokens> {
    let url = token_url(kind)?;

    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", tokens.refresh_token.as_str()),
        ("client_id", config.client_id.as_str()),
    ];
    if let Some(ref secret) = config.client_secret {
        form.push(("client_secret", secret.as_str()));
    }

    let response = client()
        .post(url)
        .form(&form)
        .send()
        .await
        .map_err(|e| transport_error("Token refresh request failed", e))?;
    let response = check_status(response, "Token refresh rejected").await?;

    let refreshed: TokenResponse = response
        .json()
        .await
        .map_err(|e| transport_error("Failed to parse token response", e))?;

    Ok(OAuthTokens {
        access_token: refreshed.access_token,
        refresh_token: refreshed
            .refresh_token
            .unwrap_or_else(|| tokens.refresh_token.clone()),
        expires_at: refreshed
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}
