//! Logging setup for the bot
//!
//! Everything goes to stderr so `--once` can print its JSON report on stdout.
//! Components log with a `backend` field, so one network's connects, skips
//! and failures can be filtered out of a long-running bot's output:
//!
//! ```text
//! INFO libchorus::auth: Connected backend="mastodon"
//! INFO libchorus::backends: Posted backend="mastodon" chars=212 images=1
//! ```
//!
//! The format and level come from `--log-format`/`--loglevel`, or from
//! `CHORUS_LOG_FORMAT`/`CHORUS_LOG_LEVEL` when the bot is started without
//! flags (for instance from a systemd unit). `RUST_LOG` overrides both.
//!
//! ```no_run
//! use libchorus::logging::{LogFormat, LoggingConfig};
//!
//! // JSON lines for a log shipper
//! LoggingConfig::new(LogFormat::Json, "info").init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// HTTP stack crates that are only interesting when debugging the wire
const CHATTY_TARGETS: [&str; 4] = ["reqwest", "hyper", "hyper_util", "rustls"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines without colors, suited to journald and log files
    Text,
    /// One JSON object per event with the fields flattened
    Json,
    /// Multi-line colored output for watching a bot at the terminal
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level or filter directive, e.g. `info` or `warn,libchorus=debug`
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
        }
    }

    /// Read `CHORUS_LOG_FORMAT` and `CHORUS_LOG_LEVEL`
    ///
    /// Unset or unparseable values fall back to text at info level.
    pub fn from_env() -> Self {
        let format = std::env::var("CHORUS_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var("CHORUS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self::new(format, level)
    }

    /// Filter directives for the configured level
    ///
    /// HTTP crates stay at `warn` unless the level asks for debug output.
    pub fn directives(&self) -> String {
        let level = self.level.to_lowercase();
        if level == "debug" || level == "trace" {
            return level;
        }

        let mut directives = vec![level];
        directives.extend(CHATTY_TARGETS.iter().map(|target| format!("{}=warn", target)));
        directives.join(",")
    }

    /// Install the global subscriber
    ///
    /// # Panics
    ///
    /// Panics if a subscriber has already been installed
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()));

        match self.format {
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .flatten_event(true)
                    .with_target(true)
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(true)
                    .init();
            }
        }
    }
}

/// Install logging configured from the environment only
pub fn init_default() {
    LoggingConfig::from_env().init();
}
