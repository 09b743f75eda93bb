//! Error types for the calsync engine.

use thiserror::Error;

/// Errors that can occur while syncing calendars.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP {status}: {context}")]
    Http { status: u16, context: String },

    #[error("Provider is read-only: {0}")]
    ReadOnly(String),

    #[error("Credentials mismatch: {0}")]
    CredentialMismatch(String),

    #[error("OAuth2 refresh is not supported for provider '{0}'")]
    UnsupportedOAuthProvider(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Wrap a non-success HTTP response with enough context to diagnose it.
    pub fn http(status: u16, context: impl Into<String>) -> Self {
        SyncError::Http {
            status,
            context: context.into(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type alias for calsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
