//! Mastodon backend

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::debug;

use super::{send_with_session, Backend, BackendLimits, SetupPrompt, Status, Transport};
use crate::auth::Authenticator;
use crate::clock::Clock;
use crate::config::{Config, MastodonConfig};
use crate::error::Result;
use crate::transport::MastodonHttp;
use crate::types::{PostRef, ReplyStyle};

pub const NAME: &str = "mastodon";

/// Character limit of a stock Mastodon instance
pub const DEFAULT_MAX_LENGTH: usize = 500;

fn limits(max_length: usize) -> BackendLimits {
    BackendLimits {
        max_text_length: max_length,
        max_text_length_with_image: max_length,
        max_image_bytes: 10_000_000,
        // 3840x2160
        max_image_pixels: Some(8_294_400),
        max_image_count: 4,
        ellipsis_length: 1,
    }
}

pub struct MastodonBackend<T = MastodonHttp> {
    transport: T,
    auth: Authenticator,
    limits: BackendLimits,
    live: bool,
}

impl MastodonBackend<MastodonHttp> {
    pub fn from_config(config: &MastodonConfig, live: bool, clock: Arc<dyn Clock>) -> Result<Self> {
        let transport = MastodonHttp::new(
            &config.instance,
            SecretString::from(config.access_token.clone()),
        )?;
        Ok(Self::with_transport(transport, live, clock)
            .with_max_length(config.max_length.unwrap_or(DEFAULT_MAX_LENGTH)))
    }

    /// An instance without credentials, only useful for [`Backend::setup`]
    pub fn unconfigured(clock: Arc<dyn Clock>) -> Result<Self> {
        let transport = MastodonHttp::new("localhost", SecretString::from(String::new()))?;
        Ok(Self::with_transport(transport, false, clock))
    }
}

impl<T: Transport> MastodonBackend<T> {
    pub fn with_transport(transport: T, live: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            auth: Authenticator::new(NAME, clock),
            limits: limits(DEFAULT_MAX_LENGTH),
            live,
        }
    }

    /// Override the instance character limit
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.limits = limits(max_length);
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }
}

#[async_trait]
impl<T: Transport> Backend for MastodonBackend<T> {
    fn name(&self) -> &str {
        NAME
    }

    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn reply_style(&self) -> ReplyStyle {
        ReplyStyle::FlatId
    }

    async fn auth(&mut self) -> Result<()> {
        if !self.live {
            debug!(backend = NAME, "Dry run, not connecting");
            return Ok(());
        }
        self.auth.auth(&mut self.transport).await
    }

    fn setup(&self, prompt: &mut dyn SetupPrompt, config: &mut Config) -> Result<bool> {
        let instance = prompt.ask("Mastodon instance (e.g. mastodon.social)")?;
        if instance.trim().is_empty() {
            return Ok(false);
        }
        let access_token = prompt.ask_secret("Mastodon access token")?;

        config.mastodon = Some(MastodonConfig {
            instance: instance.trim().to_string(),
            access_token: access_token.trim().to_string(),
            max_length: None,
        });
        Ok(true)
    }

    async fn send(&mut self, status: Status<'_>) -> Result<Option<PostRef>> {
        send_with_session(NAME, &mut self.auth, &mut self.transport, &status).await
    }

    fn rate_limit_expiry(&self) -> Option<i64> {
        self.auth.rate_limit().expiry()
    }

    fn restore_rate_limit(&mut self, expiry: i64) {
        self.auth.restore_rate_limit(expiry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{LoginOutcome, MockTransport};
    use crate::clock::ManualClock;
    use crate::error::{ChorusError, PlatformError};
    use crate::types::{PostRequest, ReplyRef};

    fn backend(transport: MockTransport) -> MastodonBackend<MockTransport> {
        MastodonBackend::with_transport(transport, true, Arc::new(ManualClock::new(1_000)))
    }

    #[test]
    fn test_limits() {
        let backend = backend(MockTransport::new(NAME, ReplyStyle::FlatId));
        assert_eq!(backend.limits().max_text_length, 500);
        assert_eq!(backend.limits().max_image_pixels, Some(8_294_400));

        let backend = backend.with_max_length(5000);
        assert_eq!(backend.limits().text_limit(true), 5000);
    }

    #[tokio::test]
    async fn test_reply_uses_flat_id() {
        let transport = MockTransport::new(NAME, ReplyStyle::FlatId);
        let mut backend = backend(transport.clone());
        let request = PostRequest::new("reply").in_reply_to(NAME, ReplyRef::Id("109".to_string()));

        let posted = backend.post(&request).await.unwrap();

        assert_eq!(posted, Some(PostRef::id("mastodon-1")));
        assert_eq!(
            transport.published()[0].reply_to,
            Some(ReplyRef::Id("109".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reply_target_for_other_backend_is_ignored() {
        let transport = MockTransport::new(NAME, ReplyStyle::FlatId);
        let mut backend = backend(transport.clone());
        let request = PostRequest::new("hi").in_reply_to("bluesky", ReplyRef::Id("1".to_string()));

        backend.post(&request).await.unwrap();
        assert_eq!(transport.published()[0].reply_to, None);
    }

    #[tokio::test]
    async fn test_bad_credentials_fail_the_post() {
        let transport = MockTransport::new(NAME, ReplyStyle::FlatId)
            .with_login_outcomes(vec![LoginOutcome::Fail("The access token is invalid".to_string())]);
        let mut backend = backend(transport);

        let error = backend.post(&PostRequest::new("hi")).await.unwrap_err();
        assert!(matches!(
            error,
            ChorusError::Platform(PlatformError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_wrapped_post_becomes_thread() {
        let transport = MockTransport::new(NAME, ReplyStyle::FlatId);
        let mut backend = backend(transport.clone()).with_max_length(50);
        let text = "word ".repeat(30);
        let request = PostRequest::new(text).wrapped().unwrap();

        let last = backend.post(&request).await.unwrap().unwrap();
        let published = transport.published();

        assert!(published.len() > 1);
        assert_eq!(published[0].reply_to, None);
        assert_eq!(published[1].reply_to, Some(ReplyRef::Id("mastodon-1".to_string())));
        assert_eq!(last, PostRef::id(format!("mastodon-{}", published.len())));
        assert!(published.iter().all(|p| p.text.chars().count() <= 50));
    }
}
