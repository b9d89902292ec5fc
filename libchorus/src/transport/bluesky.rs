//! Bluesky (AT Protocol) transport

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{build_client, check_response, network_error, ResetHeader};
use crate::backends::{Status, Transport};
use crate::error::{map_http_status, PlatformError, Result};
use crate::types::{PostRef, ReplyRef, StrongRef};

/// Default PDS URL for Bluesky
pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

const RESET: ResetHeader = ResetHeader::Epoch("ratelimit-reset");

/// XRPC error names meaning the session itself is no longer usable
///
/// The PDS reports an expired access token as HTTP 400, not 401.
const SESSION_ERRORS: &[&str] = &["ExpiredToken", "InvalidToken", "AuthenticationRequired"];

struct Session {
    access_jwt: SecretString,
    did: String,
}

/// Bluesky transport over XRPC
pub struct BlueskyHttp {
    client: Client,
    pds_url: String,
    identifier: String,
    password: SecretString,
    session: Option<Session>,
}

impl BlueskyHttp {
    /// Create a transport; no request is made until [`Transport::login`]
    pub fn new(identifier: &str, password: SecretString, pds_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            pds_url: pds_url
                .unwrap_or(DEFAULT_PDS_URL)
                .trim_end_matches('/')
                .to_string(),
            identifier: identifier.to_string(),
            password,
            session: None,
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.pds_url, method)
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            PlatformError::Authentication("Bluesky session not established".to_string()).into()
        })
    }

    async fn upload_blob(&self, session: &Session, data: &[u8], mime: &str) -> Result<Value> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(session.access_jwt.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| network_error("Bluesky", "upload blob", e))?;
        let response =
            check_response("Bluesky", "upload blob", RESET, classify_xrpc_error, response).await?;

        let uploaded: UploadBlobResponse = response
            .json()
            .await
            .map_err(|e| network_error("Bluesky", "upload blob", e))?;
        Ok(uploaded.blob)
    }
}

#[async_trait]
impl Transport for BlueskyHttp {
    async fn login(&mut self) -> Result<()> {
        let request = CreateSessionRequest {
            identifier: &self.identifier,
            password: self.password.expose_secret(),
        };

        let response = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error("Bluesky", "login", e))?;
        let response =
            check_response("Bluesky", "login", RESET, classify_xrpc_error, response).await?;

        let session: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| network_error("Bluesky", "login", e))?;

        debug!(did = %session.did, "Bluesky session created");
        self.session = Some(Session {
            access_jwt: SecretString::from(session.access_jwt),
            did: session.did,
        });
        Ok(())
    }

    async fn publish(&mut self, status: &Status<'_>) -> Result<PostRef> {
        let session = self.session()?;

        if let Some(geo) = status.geo {
            debug!(
                latitude = geo.latitude,
                longitude = geo.longitude,
                "Bluesky posts carry no location, ignoring coordinates"
            );
        }

        let mut embeds = Vec::with_capacity(status.images.len());
        for image in status.images {
            let blob = self
                .upload_blob(session, &image.data, image.mime_type.as_str())
                .await?;
            embeds.push((image.description.as_str(), blob));
        }

        let created_at = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let record = build_record(status, embeds, &created_at)?;

        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(session.access_jwt.expose_secret())
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| network_error("Bluesky", "create record", e))?;
        let response = check_response(
            "Bluesky",
            "create record",
            RESET,
            classify_xrpc_error,
            response,
        )
        .await?;

        let created: StrongRef = response
            .json()
            .await
            .map_err(|e| network_error("Bluesky", "create record", e))?;
        Ok(PostRef::Record(created))
    }
}

/// Classify a failed XRPC response
///
/// Session errors become [`PlatformError::Authentication`] whatever the
/// status code, so the authenticator drops the session and logs in again.
/// Everything else follows [`map_http_status`].
fn classify_xrpc_error(
    backend: &str,
    context: &str,
    status: u16,
    body: &str,
    reset_at: Option<i64>,
) -> PlatformError {
    let name = serde_json::from_str::<XrpcError>(body)
        .ok()
        .and_then(|error| error.error);

    match name.as_deref() {
        Some(name) if SESSION_ERRORS.contains(&name) => PlatformError::Authentication(format!(
            "{} session no longer valid ({}): HTTP {} {}",
            backend, context, status, body
        )),
        _ => map_http_status(backend, context, status, body, reset_at),
    }
}

/// Build an `app.bsky.feed.post` record
fn build_record(status: &Status<'_>, embeds: Vec<(&str, Value)>, created_at: &str) -> Result<Value> {
    let mut record = json!({
        "$type": "app.bsky.feed.post",
        "text": status.text,
        "createdAt": created_at,
    });

    if !embeds.is_empty() {
        let images: Vec<Value> = embeds
            .into_iter()
            .map(|(alt, blob)| json!({ "alt": alt, "image": blob }))
            .collect();
        record["embed"] = json!({
            "$type": "app.bsky.embed.images",
            "images": images,
        });
    }

    match status.reply_to {
        None => {}
        Some(ReplyRef::Thread { root, parent }) => {
            record["reply"] = json!({ "root": root, "parent": parent });
        }
        Some(other) => {
            return Err(PlatformError::Validation(format!(
                "Bluesky replies need a root and parent record, got {:?}",
                other
            ))
            .into());
        }
    }

    Ok(record)
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    did: String,
}

#[derive(Deserialize)]
struct XrpcError {
    error: Option<String>,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: Value,
}
