//! HTTP transports for the real networks
//!
//! Each transport owns a [`reqwest::Client`] and speaks one API. Failed
//! responses go through the network's [`Classify`] function, which starts
//! from [`map_http_status`](crate::error::map_http_status); for 429
//! responses the network's reset header is parsed so the authenticator knows
//! how long to back off.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Response};

use crate::error::PlatformError;

pub mod bluesky;
pub mod mastodon;

pub use bluesky::BlueskyHttp;
pub use mastodon::MastodonHttp;

const USER_AGENT: &str = concat!("chorus/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How a network advertises the end of a rate limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResetHeader {
    /// Unix timestamp in seconds
    Epoch(&'static str),
    /// RFC 3339 timestamp
    Rfc3339(&'static str),
}

impl ResetHeader {
    pub(crate) fn parse(&self, headers: &HeaderMap) -> Option<i64> {
        let (name, epoch) = match self {
            ResetHeader::Epoch(name) => (*name, true),
            ResetHeader::Rfc3339(name) => (*name, false),
        };
        let raw = headers.get(name)?.to_str().ok()?.trim();

        if epoch {
            raw.parse::<i64>().ok()
        } else {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|at| at.timestamp())
        }
    }
}

/// Turns a failed response into a [`PlatformError`]
///
/// Arguments: backend name, request context, HTTP status, body, reset time.
pub(crate) type Classify = fn(&str, &str, u16, &str, Option<i64>) -> PlatformError;

pub(crate) fn build_client() -> Result<Client, PlatformError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))
}

pub(crate) fn network_error(backend: &str, context: &str, error: reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("{} request failed ({}): {}", backend, context, error))
}

/// Pass successful responses through, classify the rest
pub(crate) async fn check_response(
    backend: &str,
    context: &str,
    reset: ResetHeader,
    classify: Classify,
    response: Response,
) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reset_at = reset.parse(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(classify(backend, context, status.as_u16(), &body, reset_at))
}
