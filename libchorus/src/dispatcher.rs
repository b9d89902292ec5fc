//! Multi-backend publishing
//!
//! The dispatcher owns every configured backend and pushes one request to
//! each of them in turn, in configuration order. A post failure on one
//! backend is logged and recorded without stopping the others.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{error, info};

use crate::backends::Backend;
use crate::error::Result;
use crate::types::{PostRef, PostRequest};

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Backends that did not fail; `None` means dry run or skipped
    pub results: BTreeMap<String, Option<PostRef>>,
    /// Backends whose post failed, with the error message
    pub failures: BTreeMap<String, String>,
}

impl DispatchReport {
    /// Whether at least one backend actually published
    pub fn any_posted(&self) -> bool {
        self.results.values().any(Option::is_some)
    }

    pub fn all_failed(&self) -> bool {
        self.results.is_empty() && !self.failures.is_empty()
    }
}

pub struct Dispatcher {
    backends: Vec<Box<dyn Backend>>,
}

impl Dispatcher {
    /// Create a dispatcher over `backends`, posting in the given order
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use libchorus::backends::create_backends;
    /// use libchorus::clock::SystemClock;
    /// use libchorus::dispatcher::Dispatcher;
    /// use libchorus::{Config, PostRequest};
    ///
    /// # async fn example() -> libchorus::Result<()> {
    /// let config = Config::load("mybot", None)?;
    /// let mut dispatcher = Dispatcher::new(create_backends(&config, true, Arc::new(SystemClock))?);
    /// dispatcher.auth_all().await?;
    ///
    /// let report = dispatcher.post(&PostRequest::new("Hello, fediverse and atmosphere")).await?;
    /// for (backend, reason) in &report.failures {
    ///     eprintln!("{} failed: {}", backend, reason);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(backends: Vec<Box<dyn Backend>>) -> Self {
        Self { backends }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Authenticate every backend
    ///
    /// Rate-limited backends are deferred by their authenticator; any other
    /// login failure is returned.
    pub async fn auth_all(&mut self) -> Result<()> {
        for backend in self.backends.iter_mut() {
            backend.auth().await?;
        }
        Ok(())
    }

    /// Publish `request` to every backend, one after another
    ///
    /// Post failures are isolated per backend and collected in the report.
    /// Errors that are not post failures (bad credentials, unusable images,
    /// an invalid request) abort the fan-out and are returned.
    pub async fn post(&mut self, request: &PostRequest) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        for backend in self.backends.iter_mut() {
            let name = backend.name().to_string();
            match backend.post(request).await {
                Ok(posted) => {
                    if let Some(posted) = &posted {
                        info!(backend = %name, post = ?posted, "Published");
                    }
                    report.results.insert(name, posted);
                }
                Err(e) if e.is_post_failure() => {
                    error!(backend = %name, "Failed to post: {}", e);
                    report.failures.insert(name, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Active login rate limits, keyed by backend name
    pub fn rate_limits(&self) -> BTreeMap<String, i64> {
        self.backends
            .iter()
            .filter_map(|b| b.rate_limit_expiry().map(|expiry| (b.name().to_string(), expiry)))
            .collect()
    }

    /// Reinstate rate limits remembered from an earlier run
    pub fn restore_rate_limits(&mut self, rate_limits: &BTreeMap<String, i64>) {
        for backend in self.backends.iter_mut() {
            if let Some(expiry) = rate_limits.get(backend.name()) {
                backend.restore_rate_limit(*expiry);
            }
        }
    }
}
