//! Mock transport for testing
//!
//! A scriptable [`Transport`] that records every status it is asked to
//! publish. Clones share state, so a test can keep one handle and move
//! another into a backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::backends::{Status, Transport};
use crate::error::{PlatformError, Result};
use crate::types::{GeoPoint, PostRef, ReplyRef, ReplyStyle, StrongRef};

/// Scripted result of one login attempt
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Ok,
    /// HTTP 429 with an optional reset timestamp
    RateLimited(Option<i64>),
    Fail(String),
}

/// A status as the mock received it
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedStatus {
    pub text: String,
    pub image_descriptions: Vec<String>,
    pub image_sizes: Vec<usize>,
    pub geo: Option<GeoPoint>,
    pub reply_to: Option<ReplyRef>,
}

#[derive(Default)]
struct MockState {
    login_outcomes: VecDeque<LoginOutcome>,
    publish_failure: Option<PlatformError>,
    fail_after: Option<usize>,
    failures_left: Option<usize>,
    login_calls: usize,
    published: Vec<PublishedStatus>,
}

#[derive(Clone)]
pub struct MockTransport {
    name: String,
    style: ReplyStyle,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock that logs in and publishes successfully
    ///
    /// `style` decides whether publishes return flat ids or record references.
    pub fn new(name: &str, style: ReplyStyle) -> Self {
        Self {
            name: name.to_string(),
            style,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Script the next login attempts; once exhausted, logins succeed
    pub fn with_login_outcomes(self, outcomes: Vec<LoginOutcome>) -> Self {
        self.lock().login_outcomes = outcomes.into();
        self
    }

    /// Make every publish fail with `error`
    pub fn with_publish_failure(self, error: PlatformError) -> Self {
        self.lock().publish_failure = Some(error);
        self
    }

    /// Let `count` publishes succeed, then fail the rest with `error`
    pub fn failing_after(self, count: usize, error: PlatformError) -> Self {
        {
            let mut state = self.lock();
            state.fail_after = Some(count);
            state.publish_failure = Some(error);
        }
        self
    }

    /// Fail the next `count` publishes with `error`, then publish normally
    pub fn failing_times(self, count: usize, error: PlatformError) -> Self {
        {
            let mut state = self.lock();
            state.failures_left = Some(count);
            state.publish_failure = Some(error);
        }
        self
    }

    pub fn login_calls(&self) -> usize {
        self.lock().login_calls
    }

    pub fn published(&self) -> Vec<PublishedStatus> {
        self.lock().published.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn login(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.login_calls += 1;

        match state.login_outcomes.pop_front().unwrap_or(LoginOutcome::Ok) {
            LoginOutcome::Ok => Ok(()),
            LoginOutcome::RateLimited(reset_at) => Err(PlatformError::RateLimit {
                message: format!("{} login rate limited", self.name),
                reset_at,
            }
            .into()),
            LoginOutcome::Fail(message) => Err(PlatformError::Authentication(message).into()),
        }
    }

    async fn publish(&mut self, status: &Status<'_>) -> Result<PostRef> {
        let mut state = self.lock();

        let failing = match (state.failures_left, state.fail_after) {
            (Some(0), _) => false,
            (Some(left), _) => {
                state.failures_left = Some(left - 1);
                true
            }
            (None, Some(count)) => state.published.len() >= count,
            (None, None) => true,
        };
        if failing {
            if let Some(error) = state.publish_failure.clone() {
                return Err(error.into());
            }
        }

        state.published.push(PublishedStatus {
            text: status.text.to_string(),
            image_descriptions: status.images.iter().map(|i| i.description.clone()).collect(),
            image_sizes: status.images.iter().map(|i| i.data.len()).collect(),
            geo: status.geo,
            reply_to: status.reply_to.cloned(),
        });

        let n = state.published.len();
        Ok(match self.style {
            ReplyStyle::FlatId => PostRef::id(format!("{}-{}", self.name, n)),
            ReplyStyle::RootParent => PostRef::Record(StrongRef {
                uri: format!("at://did:plc:{}/app.bsky.feed.post/{}", self.name, n),
                cid: format!("bafy{}{}", self.name, n),
            }),
        })
    }
}
