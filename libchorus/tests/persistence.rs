//! History and state survive a restart

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use libchorus::backends::bluesky::BlueskyBackend;
use libchorus::backends::mock::{LoginOutcome, MockTransport};
use libchorus::clock::ManualClock;
use libchorus::dedup::HISTORY_CAPACITY;
use libchorus::{
    Bot, ContentGenerator, CycleOutcome, DedupCache, Dispatcher, ReplyStyle, Result, StateStore,
};
use tempfile::TempDir;

struct Queue(VecDeque<&'static str>);

#[async_trait]
impl ContentGenerator for Queue {
    async fn generate(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.0.pop_front().map(|text| vec![text.to_string()]))
    }
}

#[test]
fn test_history_is_bounded_and_reloaded() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bot.history.json");
    let clock = Arc::new(ManualClock::new(0));

    let mut cache = DedupCache::load(&path, clock.clone());
    for i in 0..=HISTORY_CAPACITY {
        cache.record(&format!("Post number {}", i));
        clock.advance(1);
    }
    assert_eq!(cache.len(), HISTORY_CAPACITY);

    let reloaded = DedupCache::load(&path, clock);
    assert_eq!(reloaded.len(), HISTORY_CAPACITY);
    assert!(!reloaded.is_duplicate("Post number 0"));
    assert!(reloaded.is_duplicate("POST NUMBER 1"));
    assert!(reloaded.is_duplicate(&format!("post number {}", HISTORY_CAPACITY)));
    assert_eq!(reloaded.entries().next().unwrap().timestamp, 1);
}

#[tokio::test]
async fn test_rate_limit_is_remembered_across_restarts() {
    let temp_dir = TempDir::new().unwrap();
    let state_path = temp_dir.path().join("bot.state.json");
    let history_path = temp_dir.path().join("bot.history.json");
    let clock = Arc::new(ManualClock::new(1_000));

    // First run: login is rate limited until 5_000
    let first = MockTransport::new("bluesky", ReplyStyle::RootParent)
        .with_login_outcomes(vec![LoginOutcome::RateLimited(Some(5_000))]);
    let mut bot = Bot::new(
        Default::default(),
        Queue(VecDeque::from(["hello"])),
        Dispatcher::new(vec![Box::new(BlueskyBackend::with_transport(
            first.clone(),
            true,
            clock.clone(),
        ))]),
        DedupCache::load(&history_path, clock.clone()),
        StateStore::load(&state_path),
    );
    bot.auth().await.unwrap();
    assert_eq!(first.login_calls(), 1);
    drop(bot);

    assert_eq!(StateStore::load(&state_path).state().rate_limits["bluesky"], 5_000);

    // Second run, still inside the window: no login attempt, post skipped
    let second = MockTransport::new("bluesky", ReplyStyle::RootParent);
    let mut bot = Bot::new(
        Default::default(),
        Queue(VecDeque::from(["hello again"])),
        Dispatcher::new(vec![Box::new(BlueskyBackend::with_transport(
            second.clone(),
            true,
            clock.clone(),
        ))]),
        DedupCache::load(&history_path, clock.clone()),
        StateStore::load(&state_path),
    );
    bot.auth().await.unwrap();

    let outcome = bot.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Posted(report) => assert_eq!(report.results["bluesky"], None),
        other => panic!("Expected a dispatched post, got {:?}", other),
    }
    assert_eq!(second.login_calls(), 0);
    assert!(second.published().is_empty());

    // Once the window has passed the backend connects again
    clock.set(5_000);
    let mut bot = Bot::new(
        Default::default(),
        Queue(VecDeque::from(["third time"])),
        Dispatcher::new(vec![Box::new(BlueskyBackend::with_transport(
            second.clone(),
            true,
            clock.clone(),
        ))]),
        DedupCache::load(&history_path, clock.clone()),
        StateStore::load(&state_path),
    );
    bot.run_cycle().await.unwrap();

    assert_eq!(second.login_calls(), 1);
    assert_eq!(second.published()[0].text, "third time");
    assert!(StateStore::load(&state_path).state().rate_limits.is_empty());
}

#[tokio::test]
async fn test_posted_content_is_not_repeated_after_restart() {
    let temp_dir = TempDir::new().unwrap();
    let history_path = temp_dir.path().join("bot.history.json");
    let state_path = temp_dir.path().join("bot.state.json");
    let clock = Arc::new(ManualClock::new(1_000));
    let sky = MockTransport::new("bluesky", ReplyStyle::RootParent);

    for _ in 0..2 {
        let mut bot = Bot::new(
            Default::default(),
            Queue(VecDeque::from(["Same thought", "same THOUGHT"])),
            Dispatcher::new(vec![Box::new(BlueskyBackend::with_transport(
                sky.clone(),
                true,
                clock.clone(),
            ))]),
            DedupCache::load(&history_path, clock.clone()),
            StateStore::load(&state_path),
        );
        bot.run_cycle().await.unwrap();
    }

    let texts: Vec<String> = sky.published().into_iter().map(|p| p.text).collect();
    assert_eq!(texts, vec!["Same thought"]);
}
