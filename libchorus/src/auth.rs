//! Rate-limit-aware session handling
//!
//! ```text
//! Disconnected --auth()--> Authenticating --ok--> Connected
//!       ^                        |
//!       |                        +--429--> RateLimited(until)
//!       +----- auth() before `until` is a no-op -----+
//! ```
//!
//! A backend that answered a login with HTTP 429 is not contacted again
//! until the reset time it advertised has passed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backends::Transport;
use crate::clock::Clock;
use crate::error::{ChorusError, PlatformError, Result};

/// Fallback wait when a 429 response carries no reset time
pub const DEFAULT_RATE_LIMIT_BACKOFF_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    Connected,
    RateLimited { until: i64 },
}

/// Login rate limit of one backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    expiry: Option<i64>,
}

impl RateLimitState {
    pub fn until(expiry: i64) -> Self {
        Self {
            expiry: Some(expiry),
        }
    }

    pub fn expiry(&self) -> Option<i64> {
        self.expiry
    }

    /// Seconds left before login may be attempted, if still limited
    pub fn remaining(&self, now: i64) -> Option<i64> {
        match self.expiry {
            Some(expiry) if expiry > now => Some(expiry - now),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.expiry = None;
    }
}

/// Connection state machine for one backend
pub struct Authenticator {
    backend: String,
    state: ConnectionState,
    rate_limit: RateLimitState,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(backend: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: backend.into(),
            state: ConnectionState::Disconnected,
            rate_limit: RateLimitState::default(),
            clock,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn rate_limit(&self) -> RateLimitState {
        self.rate_limit
    }

    /// Reinstate a rate limit remembered from an earlier run
    pub fn restore_rate_limit(&mut self, expiry: i64) {
        self.rate_limit = RateLimitState::until(expiry);
        if self.rate_limit.remaining(self.clock.now()).is_some() && !self.is_connected() {
            self.state = ConnectionState::RateLimited { until: expiry };
        }
    }

    /// Forget the session, e.g. after the backend rejected a token
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Log in through `transport`
    ///
    /// Skips the network entirely while a rate limit is active. A 429 from
    /// the backend records its reset time and leaves the session
    /// disconnected; neither case is an error. Every other login failure is
    /// returned to the caller.
    pub async fn auth<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        let now = self.clock.now();
        if let Some(remaining) = self.rate_limit.remaining(now) {
            warn!(
                backend = %self.backend,
                "Not connecting as login rate limit is still active. \
                 Will re-attempt connection in {} seconds.",
                remaining
            );
            self.state = ConnectionState::RateLimited {
                until: now + remaining,
            };
            return Ok(());
        }

        self.state = ConnectionState::Authenticating;

        match transport.login().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.rate_limit.clear();
                info!(backend = %self.backend, "Connected");
                Ok(())
            }
            Err(ChorusError::Platform(PlatformError::RateLimit { reset_at, .. })) => {
                let until = reset_at.unwrap_or(now + DEFAULT_RATE_LIMIT_BACKOFF_SECS);
                self.rate_limit = RateLimitState::until(until);
                self.state = ConnectionState::RateLimited { until };
                warn!(
                    backend = %self.backend,
                    "Rate-limited when connecting. Will re-attempt connection in {} seconds.",
                    until - now
                );
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Authenticate lazily before a post
    ///
    /// Returns whether the session is connected afterwards.
    pub async fn ensure_connected<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<bool> {
        if !self.is_connected() {
            self.auth(transport).await?;
        }
        Ok(self.is_connected())
    }
}
