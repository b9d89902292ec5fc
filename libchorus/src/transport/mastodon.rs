//! Mastodon REST transport

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_client, check_response, network_error, ResetHeader};
use crate::backends::{Status, Transport};
use crate::error::{map_http_status, PlatformError, Result};
use crate::media::Image;
use crate::types::{PostRef, ReplyRef};

const RESET: ResetHeader = ResetHeader::Rfc3339("x-ratelimit-reset");

/// Mastodon transport authenticated by an access token
pub struct MastodonHttp {
    client: Client,
    base_url: String,
    access_token: SecretString,
}

impl MastodonHttp {
    /// `instance` may be a bare host name or a full URL
    pub fn new(instance: &str, access_token: SecretString) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: instance_url(instance),
            access_token,
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api{}", self.base_url, endpoint)
    }

    async fn upload_media(&self, image: &Image) -> Result<String> {
        let part = Part::bytes(image.data.clone())
            .file_name(format!("image.{}", image.mime_type.extension()))
            .mime_str(image.mime_type.as_str())
            .map_err(|e| PlatformError::Validation(format!("Bad media type: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("description", image.description.clone());

        let response = self
            .client
            .post(self.api_url("/v2/media"))
            .bearer_auth(self.access_token.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error("Mastodon", "upload media", e))?;
        let response =
            check_response("Mastodon", "upload media", RESET, map_http_status, response).await?;

        let media: MediaAttachment = response
            .json()
            .await
            .map_err(|e| network_error("Mastodon", "upload media", e))?;
        Ok(media.id)
    }
}

#[async_trait]
impl Transport for MastodonHttp {
    async fn login(&mut self) -> Result<()> {
        let response = self
            .client
            .get(self.api_url("/v1/accounts/verify_credentials"))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| network_error("Mastodon", "verify credentials", e))?;
        let response =
            check_response("Mastodon", "verify credentials", RESET, map_http_status, response).await?;

        let account: Account = response
            .json()
            .await
            .map_err(|e| network_error("Mastodon", "verify credentials", e))?;
        debug!(account = %account.acct, "Mastodon credentials verified");
        Ok(())
    }

    async fn publish(&mut self, status: &Status<'_>) -> Result<PostRef> {
        let in_reply_to_id = match status.reply_to {
            None => None,
            Some(ReplyRef::Id(id)) => Some(id.as_str()),
            Some(other) => {
                return Err(PlatformError::Validation(format!(
                    "Mastodon replies need a status id, got {:?}",
                    other
                ))
                .into());
            }
        };

        if status.geo.is_some() {
            debug!("Mastodon statuses carry no location, ignoring coordinates");
        }

        let mut media_ids = Vec::with_capacity(status.images.len());
        for image in status.images {
            media_ids.push(self.upload_media(image).await?);
        }

        let request = StatusRequest {
            status: status.text,
            media_ids,
            in_reply_to_id,
        };

        let response = self
            .client
            .post(self.api_url("/v1/statuses"))
            .bearer_auth(self.access_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error("Mastodon", "post status", e))?;
        let response =
            check_response("Mastodon", "post status", RESET, map_http_status, response).await?;

        let posted: PostedStatus = response
            .json()
            .await
            .map_err(|e| network_error("Mastodon", "post status", e))?;
        Ok(PostRef::id(posted.id))
    }
}

fn instance_url(instance: &str) -> String {
    let instance = instance.trim().trim_end_matches('/');
    if instance.starts_with("http://") || instance.starts_with("https://") {
        instance.to_string()
    } else {
        format!("https://{}", instance)
    }
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_reply_to_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct Account {
    acct: String,
}

#[derive(Deserialize)]
struct MediaAttachment {
    id: String,
}

#[derive(Deserialize)]
struct PostedStatus {
    id: String,
}
