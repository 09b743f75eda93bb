//! Credential freshness for OAuth2 accounts.

use chrono::{DateTime, Duration, Utc};

use calsync_core::config::TOKEN_REFRESH_BUFFER_MINUTES;
use calsync_core::repo::AccountsRepo;
use calsync_core::{Account, Credentials, OAuthTokens, SyncResult};
use calsync_providers::oauth::refresh_access_token;

use crate::config::EngineConfig;

/// Whether a token set is expired (with the safety buffer) at `now`.
/// Tokens without a recorded expiry are treated as expired.
pub fn needs_refresh(tokens: &OAuthTokens, now: DateTime<Utc>) -> bool {
    match tokens.expires_at {
        Some(expires_at) => now >= expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES),
        None => true,
    }
}

/// Return credentials that are valid for at least the buffer window.
///
/// Non-OAuth2 credentials pass through unchanged. Expiring OAuth2 tokens
/// are refreshed against the provider's token endpoint and persisted before
/// being returned, so a crash after refresh cannot strand the new refresh
/// token.
pub async fn ensure_fresh_credentials(
    account: &Account,
    accounts: &AccountsRepo,
    config: &EngineConfig,
) -> SyncResult<Credentials> {
    let credentials = accounts.credentials(&account.id).await?;
    let tokens = match &credentials {
        Credentials::OAuth2(tokens) => tokens,
        _ => return Ok(credentials),
    };
    if !needs_refresh(tokens, Utc::now()) {
        return Ok(credentials);
    }

    let client = config.oauth_client(account.provider)?;
    let refreshed = refresh_access_token(account.provider, &client, tokens).await?;
    accounts.update_oauth_tokens(&account.id, &refreshed).await?;
    tracing::info!(account = %account.id, provider = %account.provider, "refreshed OAuth tokens");
    Ok(Credentials::OAuth2(refreshed))
}
