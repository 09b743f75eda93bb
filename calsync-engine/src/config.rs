//! Engine configuration.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [google]
//! client_id = "your-client-id.apps.googleusercontent.com"
//! client_secret = "your-client-secret"
//!
//! [outlook]
//! client_id = "your-azure-app-id"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use calsync_core::config::OAuthClientConfig;
use calsync_core::{ProviderKind, SyncError, SyncResult};

/// Public client registration used for Outlook accounts when no Azure app
/// is configured. Microsoft allows this id without a client secret.
pub const DEFAULT_OUTLOOK_CLIENT_ID: &str = "9e5f94bc-e8a4-4e73-b8be-63364c29d753";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub google: Option<OAuthClientConfig>,
    pub outlook: Option<OAuthClientConfig>,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// The OAuth client registration to use for a provider. Google requires
    /// explicit configuration; Outlook falls back to the built-in public
    /// client id.
    pub fn oauth_client(&self, kind: ProviderKind) -> SyncResult<OAuthClientConfig> {
        match kind {
            ProviderKind::Google => self.google.clone().ok_or_else(|| {
                SyncError::Config(
                    "Google OAuth client is not configured (set [google] client_id/client_secret)"
                        .into(),
                )
            }),
            ProviderKind::Outlook => Ok(self.outlook.clone().unwrap_or(OAuthClientConfig {
                client_id: DEFAULT_OUTLOOK_CLIENT_ID.to_string(),
                client_secret: None,
            })),
            other => Err(SyncError::UnsupportedOAuthProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config() {
        let config: EngineConfig = toml::from_str(
            r#"
            [google]
            client_id = "abc.apps.googleusercontent.com"
            client_secret = "shh"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.google.as_ref().unwrap().client_id,
            "abc.apps.googleusercontent.com"
        );
        assert!(config.outlook.is_none());
    }

    #[test]
    fn outlook_falls_back_to_the_builtin_client() {
        let config = EngineConfig::default();
        let client = config.oauth_client(ProviderKind::Outlook).unwrap();
        assert_eq!(client.client_id, DEFAULT_OUTLOOK_CLIENT_ID);
        assert!(client.client_secret.is_none());
    }

    #[test]
    fn google_requires_explicit_configuration() {
        let config = EngineConfig::default();
        assert!(matches!(
            config.oauth_client(ProviderKind::Google),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn non_oauth_providers_are_rejected() {
        let config = EngineConfig::default();
        assert!(matches!(
            config.oauth_client(ProviderKind::Ical),
            Err(SyncError::UnsupportedOAuthProvider(_))
        ));
    }
}
