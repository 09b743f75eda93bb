//! Shared HTTP plumbing for all adapters.

use once_cell::sync::Lazy;
use reqwest::{Client, Response};

use calsync_core::{SyncError, SyncResult};

static CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// One shared client; reqwest pools connections per host internally.
pub(crate) fn client() -> &'static Client {
    &CLIENT
}

const BODY_SNIPPET_LEN: usize = 200;

/// Turn a non-2xx response into a [`SyncError::Http`] carrying the status
/// and a snippet of the body.
pub(crate) async fn check_status(response: Response, context: &str) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(BODY_SNIPPET_LEN).collect();
    Err(SyncError::http(
        status.as_u16(),
        format!("{}: {}", context, snippet.trim()),
    ))
}

/// Wrap a transport-level reqwest failure.
pub(crate) fn transport_error(context: &str, error: reqwest::Error) -> SyncError {
    SyncError::Provider(format!("{}: {}", context, error))
}
