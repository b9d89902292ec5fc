//! Backend abstraction and implementations
//!
//! A [`Backend`] is one configured social network. It owns its session
//! state and limits, and turns a [`PostRequest`] into one direct post or a
//! wrapped thread. The network calls themselves go through a [`Transport`],
//! so every backend can be exercised against [`mock::MockTransport`].
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libchorus::backends::create_backends;
//! use libchorus::clock::SystemClock;
//! use libchorus::{Config, PostRequest};
//!
//! # async fn example() -> libchorus::Result<()> {
//! let config = Config::load("mybot", None)?;
//! let mut backends = create_backends(&config, true, Arc::new(SystemClock))?;
//!
//! for backend in backends.iter_mut() {
//!     backend.auth().await?;
//!     let posted = backend.post(&PostRequest::new("Hello from chorus")).await?;
//!     println!("{}: {:?}", backend.name(), posted);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{ChorusError, PlatformError, Result};
use crate::fit::select_best_fit;
use crate::media::{prepare_all, Image};
use crate::segment::post_thread;
use crate::types::{GeoPoint, PostRef, PostRequest, ReplyRef, ReplyStyle};

pub mod bluesky;
pub mod mastodon;

// Mock transport is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Length and media ceilings of one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendLimits {
    pub max_text_length: usize,
    /// Some networks allow less text once media is attached
    pub max_text_length_with_image: usize,
    pub max_image_bytes: usize,
    pub max_image_pixels: Option<u64>,
    pub max_image_count: usize,
    /// Characters reserved for the continuation marker of wrapped posts
    pub ellipsis_length: usize,
}

impl BackendLimits {
    pub fn text_limit(&self, has_images: bool) -> usize {
        if has_images {
            self.max_text_length_with_image
        } else {
            self.max_text_length
        }
    }
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_text_length: 500,
            max_text_length_with_image: 500,
            max_image_bytes: 10_000_000,
            max_image_pixels: None,
            max_image_count: 4,
            ellipsis_length: 1,
        }
    }
}

/// One outgoing post, after text selection and image preparation
#[derive(Debug, Clone, Copy)]
pub struct Status<'a> {
    pub text: &'a str,
    pub images: &'a [Image],
    pub geo: Option<GeoPoint>,
    pub reply_to: Option<&'a ReplyRef>,
}

/// Authenticated network access to one backend
///
/// Implementations perform the raw HTTP calls. A rejected login caused by
/// rate limiting must surface as `PlatformError::RateLimit` carrying the
/// backend's reset timestamp.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn login(&mut self) -> Result<()>;

    async fn publish(&mut self, status: &Status<'_>) -> Result<PostRef>;
}

/// Source of answers for interactive backend setup
pub trait SetupPrompt {
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Ask without echoing the answer
    fn ask_secret(&mut self, question: &str) -> Result<String>;
}

/// Backend trait for unified posting across social networks
#[async_trait]
pub trait Backend: Send + Sync {
    /// Lowercase identifier, also the config section name
    fn name(&self) -> &str;

    fn limits(&self) -> BackendLimits;

    /// Whether posts actually go out (dry run otherwise)
    fn is_live(&self) -> bool;

    /// Which reply reference shape this backend produces and accepts
    fn reply_style(&self) -> ReplyStyle;

    /// Connect to the backend
    ///
    /// Rate limiting is not an error: the backend stays disconnected and
    /// retries later. Any other login failure is returned.
    async fn auth(&mut self) -> Result<()>;

    /// Interactively collect credentials into `config`
    ///
    /// Returns `true` if `config` now contains a section for this backend.
    fn setup(&self, prompt: &mut dyn SetupPrompt, config: &mut Config) -> Result<bool>;

    /// Post one status directly
    ///
    /// Returns `Ok(None)` when the post was skipped because the backend
    /// could not connect.
    async fn send(&mut self, status: Status<'_>) -> Result<Option<PostRef>>;

    /// Unix timestamp until which login is rate limited, if any
    fn rate_limit_expiry(&self) -> Option<i64>;

    /// Restore a rate limit remembered from a previous run
    fn restore_rate_limit(&mut self, expiry: i64);

    /// Publish a request on this backend
    ///
    /// Keeps at most `max_image_count` images and fits each to the image
    /// limits. In dry-run mode nothing is sent and `Ok(None)` is returned.
    /// Wrapped requests become a thread; otherwise the best fitting candidate
    /// is posted once.
    async fn post(&mut self, request: &PostRequest) -> Result<Option<PostRef>> {
        request.validate()?;

        let limits = self.limits();
        let images = prepare_all(
            request.images(),
            limits.max_image_count,
            limits.max_image_bytes,
            limits.max_image_pixels,
        )?;

        if !self.is_live() {
            debug!(backend = self.name(), "Dry run, not posting");
            return Ok(None);
        }

        let reply_to = request.reply_target(self.name()).cloned();
        if let Some(target) = &reply_to {
            if !self.reply_style().accepts(target) {
                return Err(PlatformError::Validation(format!(
                    "{} cannot reply to {:?}",
                    self.name(),
                    target
                ))
                .into());
            }
        }

        if request.wrap() {
            return post_thread(self, request.text(), &images, request.geo(), reply_to).await;
        }

        let text = if request.candidates().len() > 1 {
            let limit = limits.text_limit(!images.is_empty());
            let picked = select_best_fit(request.candidates(), limit);
            debug!(backend = self.name(), limit, chars = picked.chars().count(), "Selected candidate");
            picked
        } else {
            request.text()
        };

        self.send(Status {
            text,
            images: &images,
            geo: request.geo(),
            reply_to: reply_to.as_ref(),
        })
        .await
    }
}

/// Send one status over an authenticated session
///
/// Connects lazily first; if the session still cannot be established (for
/// instance while rate limited) the post is skipped with `Ok(None)`. A
/// rejected session token drops the connection so the next post logs in
/// again, and is reported as an ordinary post failure.
pub(crate) async fn send_with_session<T: Transport + ?Sized>(
    backend: &str,
    auth: &mut Authenticator,
    transport: &mut T,
    status: &Status<'_>,
) -> Result<Option<PostRef>> {
    if !auth.ensure_connected(transport).await? {
        warn!(backend, "Skipping post, not connected");
        return Ok(None);
    }

    match transport.publish(status).await {
        Ok(posted) => {
            info!(backend, chars = status.text.chars().count(), images = status.images.len(), "Posted");
            Ok(Some(posted))
        }
        Err(ChorusError::Platform(PlatformError::Authentication(message))) => {
            auth.disconnect();
            Err(PlatformError::Posting(format!("{} session rejected: {}", backend, message)).into())
        }
        Err(e) => Err(e),
    }
}

/// Create backends for every configured section, in fixed order
///
/// Backends whose section is absent from `config` are not activated.
pub fn create_backends(
    config: &Config,
    live: bool,
    clock: Arc<dyn Clock>,
) -> Result<Vec<Box<dyn Backend>>> {
    let mut backends: Vec<Box<dyn Backend>> = Vec::new();

    if let Some(bluesky) = &config.bluesky {
        backends.push(Box::new(bluesky::BlueskyBackend::from_config(
            bluesky,
            live,
            clock.clone(),
        )?));
    }

    if let Some(mastodon) = &config.mastodon {
        backends.push(Box::new(mastodon::MastodonBackend::from_config(
            mastodon,
            live,
            clock.clone(),
        )?));
    }

    Ok(backends)
}

/// Unconfigured instances of every supported backend, for interactive setup
pub fn all_backends(clock: Arc<dyn Clock>) -> Result<Vec<Box<dyn Backend>>> {
    let backends: Vec<Box<dyn Backend>> = vec![
        Box::new(bluesky::BlueskyBackend::unconfigured(clock.clone())?),
        Box::new(mastodon::MastodonBackend::unconfigured(clock)?),
    ];
    Ok(backends)
}
