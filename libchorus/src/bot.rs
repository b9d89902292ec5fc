//! The posting loop
//!
//! A [`Bot`] asks its [`ContentGenerator`] for text, rejects anything it has
//! posted before, and hands the rest to the [`Dispatcher`]. Between cycles it
//! sleeps according to what happened, waking early on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::dedup::DedupCache;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::{ChorusError, Result};
use crate::fit::truncate_with_ellipsis;
use crate::state::StateStore;
use crate::types::PostRequest;

/// Source of post content
#[async_trait]
pub trait ContentGenerator: Send {
    /// Produce the candidate texts of one post, best first
    ///
    /// `Ok(None)` means there is nothing to post right now. Returning
    /// [`ChorusError::Generation`] is treated the same way.
    async fn generate(&mut self) -> Result<Option<Vec<String>>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Posted(DispatchReport),
    NoContent,
    /// Every generation attempt produced something already posted
    Duplicate,
}

pub struct Bot<G> {
    config: BotConfig,
    generator: G,
    dispatcher: Dispatcher,
    dedup: DedupCache,
    state: StateStore,
}

impl<G: ContentGenerator> Bot<G> {
    /// Assemble a bot; rate limits remembered in `state` are handed to the
    /// dispatcher's backends right away.
    pub fn new(
        config: BotConfig,
        generator: G,
        mut dispatcher: Dispatcher,
        dedup: DedupCache,
        state: StateStore,
    ) -> Self {
        dispatcher.restore_rate_limits(&state.state().rate_limits);
        Self {
            config,
            generator,
            dispatcher,
            dedup,
            state,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Authenticate every backend and remember any rate limit hit doing so
    pub async fn auth(&mut self) -> Result<()> {
        let result = self.dispatcher.auth_all().await;
        self.persist_state();
        result
    }

    /// Generate and publish one post
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let attempts = self.config.max_generation_attempts.max(1);

        for attempt in 1..=attempts {
            let candidates = match self.generator.generate().await {
                Ok(Some(candidates)) if !candidates.is_empty() => candidates,
                Ok(_) => {
                    info!("Generator has nothing to post");
                    return Ok(CycleOutcome::NoContent);
                }
                Err(ChorusError::Generation(reason)) => {
                    warn!("Content generation failed: {}", reason);
                    return Ok(CycleOutcome::NoContent);
                }
                Err(e) => return Err(e),
            };

            if self.dedup.is_duplicate(&candidates[0]) {
                info!(attempt, attempts, "Generated content was posted before, regenerating");
                continue;
            }
            self.dedup.record(&candidates[0]);

            let request = self.build_request(candidates)?;
            let report = self.dispatcher.post(&request).await;
            self.persist_state();
            return report.map(CycleOutcome::Posted);
        }

        warn!(attempts, "Giving up, every generated post was a duplicate");
        Ok(CycleOutcome::Duplicate)
    }

    /// Run cycles until `shutdown` is set
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        info!(backends = ?self.dispatcher.names(), "Bot started");

        while !shutdown.load(Ordering::Relaxed) {
            let delay = match self.run_cycle().await {
                Ok(CycleOutcome::Posted(report)) => {
                    for (backend, reason) in &report.failures {
                        warn!(backend = %backend, "Post failed: {}", reason);
                    }
                    self.config.interval
                }
                Ok(CycleOutcome::NoContent) | Ok(CycleOutcome::Duplicate) => self.config.retry_delay,
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    self.config.error_delay
                }
            };

            debug!("Sleeping for {}", humantime::format_duration(delay));
            sleep_unless_shutdown(delay, &shutdown).await;
        }

        info!("Shutdown requested, saving state");
        self.persist_state();
    }

    fn build_request(&self, mut candidates: Vec<String>) -> Result<PostRequest> {
        if self.config.wrap && candidates.len() == 1 {
            return PostRequest::with_candidates(candidates)?.wrapped();
        }

        if let Some(max_length) = self.config.max_length {
            for candidate in candidates.iter_mut() {
                *candidate = truncate_with_ellipsis(candidate, max_length);
            }
        }
        PostRequest::with_candidates(candidates)
    }

    fn persist_state(&mut self) {
        let rate_limits = self.dispatcher.rate_limits();
        self.state.set_rate_limits(rate_limits);
        self.state.save();
    }
}

/// Sleep for `duration`, checking the shutdown flag every second
async fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let step = Duration::from_secs(1);
    let mut remaining = duration;

    while !remaining.is_zero() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let nap = remaining.min(step);
        sleep(nap).await;
        remaining -= nap;
    }
}
