//! Bluesky backend

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::debug;

use super::{send_with_session, Backend, BackendLimits, SetupPrompt, Status, Transport};
use crate::auth::Authenticator;
use crate::clock::Clock;
use crate::config::{BlueskyConfig, Config};
use crate::error::Result;
use crate::transport::BlueskyHttp;
use crate::types::{PostRef, ReplyStyle};

pub const NAME: &str = "bluesky";

const LIMITS: BackendLimits = BackendLimits {
    max_text_length: 300,
    max_text_length_with_image: 300,
    max_image_bytes: 1_000_000,
    max_image_pixels: None,
    max_image_count: 4,
    ellipsis_length: 1,
};

pub struct BlueskyBackend<T = BlueskyHttp> {
    transport: T,
    auth: Authenticator,
    live: bool,
}

impl BlueskyBackend<BlueskyHttp> {
    pub fn from_config(config: &BlueskyConfig, live: bool, clock: Arc<dyn Clock>) -> Result<Self> {
        let transport = BlueskyHttp::new(
            &config.email,
            SecretString::from(config.password.clone()),
            config.pds_url.as_deref(),
        )?;
        Ok(Self::with_transport(transport, live, clock))
    }

    /// An instance without credentials, only useful for [`Backend::setup`]
    pub fn unconfigured(clock: Arc<dyn Clock>) -> Result<Self> {
        let transport = BlueskyHttp::new("", SecretString::from(String::new()), None)?;
        Ok(Self::with_transport(transport, false, clock))
    }
}

impl<T: Transport> BlueskyBackend<T> {
    pub fn with_transport(transport: T, live: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            auth: Authenticator::new(NAME, clock),
            live,
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }
}

#[async_trait]
impl<T: Transport> Backend for BlueskyBackend<T> {
    fn name(&self) -> &str {
        NAME
    }

    fn limits(&self) -> BackendLimits {
        LIMITS
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn reply_style(&self) -> ReplyStyle {
        ReplyStyle::RootParent
    }

    async fn auth(&mut self) -> Result<()> {
        if !self.live {
            debug!(backend = NAME, "Dry run, not connecting");
            return Ok(());
        }
        self.auth.auth(&mut self.transport).await
    }

    fn setup(&self, prompt: &mut dyn SetupPrompt, config: &mut Config) -> Result<bool> {
        let email = prompt.ask("Bluesky login (handle or email)")?;
        if email.trim().is_empty() {
            return Ok(false);
        }
        let password = prompt.ask_secret("Bluesky app password")?;

        config.bluesky = Some(BlueskyConfig {
            email: email.trim().to_string(),
            password,
            pds_url: None,
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
    use crate::auth::ConnectionState;
    use crate::backends::mock::{LoginOutcome, MockTransport};
    use crate::clock::ManualClock;
    use crate::error::{ChorusError, PlatformError};
    use crate::types::{PostRequest, ReplyRef};

    struct Answers(Vec<String>);

    impl SetupPrompt for Answers {
        fn ask(&mut self, _question: &str) -> Result<String> {
            Ok(self.0.remove(0))
        }

        fn ask_secret(&mut self, _question: &str) -> Result<String> {
            Ok(self.0.remove(0))
        }
    }

    fn backend(transport: MockTransport, live: bool) -> BlueskyBackend<MockTransport> {
        BlueskyBackend::with_transport(transport, live, Arc::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn test_post_connects_lazily() {
        let transport = MockTransport::new(NAME, ReplyStyle::RootParent);
        let mut backend = backend(transport.clone(), true);

        let posted = backend.post(&PostRequest::new("hello")).await.unwrap();

        assert!(matches!(posted, Some(PostRef::Record(_))));
        assert_eq!(transport.login_calls(), 1);
        assert_eq!(transport.published()[0].text, "hello");
    }

    #[tokio::test]
    async fn test_dry_run_never_touches_network() {
        let transport = MockTransport::new(NAME, ReplyStyle::RootParent);
        let mut backend = backend(transport.clone(), false);

        assert_eq!(backend.post(&PostRequest::new("hello")).await.unwrap(), None);
        assert_eq!(transport.login_calls(), 0);
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_post_is_skipped() {
        let transport = MockTransport::new(NAME, ReplyStyle::RootParent)
            .with_login_outcomes(vec![LoginOutcome::RateLimited(Some(2_000))]);
        let mut backend = backend(transport.clone(), true);

        backend.auth().await.unwrap();
        assert_eq!(backend.rate_limit_expiry(), Some(2_000));

        assert_eq!(backend.post(&PostRequest::new("hello")).await.unwrap(), None);
        assert_eq!(transport.login_calls(), 1);
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_session_disconnects() {
        let transport = MockTransport::new(NAME, ReplyStyle::RootParent)
            .with_publish_failure(PlatformError::Authentication("expired token".to_string()));
        let mut backend = backend(transport, true);

        let error = backend.post(&PostRequest::new("hello")).await.unwrap_err();

        assert!(error.is_post_failure());
        assert!(matches!(error, ChorusError::Platform(PlatformError::Posting(_))));
        assert_eq!(backend.authenticator().state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_expired_session_logs_in_again_on_next_post() {
        let transport = MockTransport::new(NAME, ReplyStyle::RootParent).failing_times(
            1,
            PlatformError::Authentication("ExpiredToken: Token has expired".to_string()),
        );
        let mut backend = backend(transport.clone(), true);

        let error = backend.post(&PostRequest::new("first")).await.unwrap_err();
        assert!(error.is_post_failure());
        assert_eq!(transport.login_calls(), 1);

        let posted = backend.post(&PostRequest::new("second")).await.unwrap();
        assert!(matches!(posted, Some(PostRef::Record(_))));
        assert_eq!(transport.login_calls(), 2);
        assert_eq!(backend.authenticator().state(), ConnectionState::Connected);
        assert_eq!(transport.published()[0].text, "second");
    }

    #[tokio::test]
    async fn test_flat_reply_target_is_rejected() {
        let mut backend = backend(MockTransport::new(NAME, ReplyStyle::RootParent), true);
        let request = PostRequest::new("hi").in_reply_to(NAME, ReplyRef::Id("1".to_string()));

        let result = backend.post(&request).await;
        assert!(matches!(
            result,
            Err(ChorusError::Platform(PlatformError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_candidates_pick_longest_fitting() {
        let transport = MockTransport::new(NAME, ReplyStyle::RootParent);
        let mut backend = backend(transport.clone(), true);
        let request = PostRequest::with_candidates(vec![
            "x".repeat(400),
            "y".repeat(250),
            "z".repeat(10),
        ])
        .unwrap();

        backend.post(&request).await.unwrap();
        assert_eq!(transport.published()[0].text, "y".repeat(250));
    }

    #[test]
    fn test_setup_writes_section() {
        let backend = backend(MockTransport::new(NAME, ReplyStyle::RootParent), false);
        let mut config = Config::default();
        let mut answers = Answers(vec![" me.bsky.social ".to_string(), "app-pass".to_string()]);

        assert!(backend.setup(&mut answers, &mut config).unwrap());
        let section = config.bluesky.unwrap();
        assert_eq!(section.email, "me.bsky.social");
        assert_eq!(section.password, "app-pass");
    }

    #[test]
    fn test_setup_blank_login_declines() {
        let backend = backend(MockTransport::new(NAME, ReplyStyle::RootParent), false);
        let mut config = Config::default();

        assert!(!backend.setup(&mut Answers(vec![String::new()]), &mut config).unwrap());
        assert!(config.bluesky.is_none());
    }
}
