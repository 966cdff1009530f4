//! Common utilities shared across connectors.
//!
//! HTTP client creation, URL validation, and the mapping of HTTP failures
//! onto the error taxonomy.

use crate::error::{Error, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default HTTP timeout for all connectors.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a configured HTTP client with timeout.
#[must_use]
pub fn create_http_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Validates a service URL.
pub fn validate_url(url: &str) -> Result<()> {
    let has_valid_scheme = ["http://", "https://"].iter().any(|s| url.starts_with(s));

    if !has_valid_scheme {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }

    if url.len() < 10 {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Joins a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Maps an HTTP error status onto the error taxonomy.
///
/// `collection` names the collection the request addressed; a 404 on such a
/// request means the collection does not exist.
pub fn handle_http_error(
    status_code: u16,
    body: &str,
    source_name: &str,
    collection: Option<&str>,
) -> Error {
    match (status_code, collection) {
        (401 | 403, _) => Error::Authentication(format!("{} auth failed: {}", source_name, body)),
        (404, Some(name)) => Error::CollectionNotFound(name.to_string()),
        _ => Error::BackendUnavailable(format!(
            "{} error {}: {}",
            source_name, status_code, body
        )),
    }
}

/// Maps a transport failure (connect, timeout, TLS) to [`Error::BackendUnavailable`].
pub fn transport_error(err: &reqwest::Error, source_name: &str) -> Error {
    Error::BackendUnavailable(format!("{} request failed: {}", source_name, err))
}

/// Checks the status of a response and decodes its JSON body.
///
/// # Errors
///
/// Non-success statuses go through [`handle_http_error`]; an undecodable
/// body is an [`Error::Normalization`].
pub async fn read_json<T: DeserializeOwned>(
    response: Response,
    source_name: &str,
    collection: Option<&str>,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(handle_http_error(status.as_u16(), &body, source_name, collection));
    }

    response.json().await.map_err(|e| {
        Error::Normalization(format!("Failed to parse {} response: {}", source_name, e))
    })
}
