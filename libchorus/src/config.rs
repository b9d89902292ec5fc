//! Configuration management for Chorus
//!
//! One TOML file per bot (and optional profile). A backend is active when its
//! section is present.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bluesky: Option<BlueskyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastodon: Option<MastodonConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Pause after a successful post
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Pause after a cycle that produced nothing new
    #[serde(with = "duration_str")]
    pub retry_delay: Duration,
    /// Pause after an unexpected failure
    #[serde(with = "duration_str")]
    pub error_delay: Duration,
    pub max_generation_attempts: u32,
    /// Split long single-candidate posts into threads
    pub wrap: bool,
    /// Hard ceiling applied to non-wrapped single-candidate posts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retry_delay: Duration::from_secs(300),
            error_delay: Duration::from_secs(60),
            max_generation_attempts: 5,
            wrap: false,
            max_length: None,
            state_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pds_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    pub instance: String,
    pub access_token: String,
    /// Instance-specific character limit (defaults to 500)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// Paths of the files a bot profile owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotPaths {
    pub config: PathBuf,
    pub history: PathBuf,
    pub state: PathBuf,
}

impl Config {
    /// Load the configuration of bot `name`, optionally for a profile
    ///
    /// A missing file yields the default configuration (no backends).
    pub fn load(name: &str, profile: Option<&str>) -> Result<Self> {
        let path = resolve_config_path(name, profile)?;
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Write configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::WriteError)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::ReadError)?;
        }
        std::fs::write(path, content).map_err(ConfigError::ReadError)?;
        Ok(())
    }

    /// Names of the backends that have a config section
    pub fn configured_backends(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.bluesky.is_some() {
            names.push("bluesky");
        }
        if self.mastodon.is_some() {
            names.push("mastodon");
        }
        names
    }

    /// Resolve config, history and state file locations for a bot profile
    pub fn paths(&self, name: &str, profile: Option<&str>) -> Result<BotPaths> {
        let stem = file_stem(name, profile);
        let state_dir = match &self.bot.state_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => resolve_data_path()?,
        };

        Ok(BotPaths {
            config: resolve_config_path(name, profile)?,
            history: state_dir.join(format!("{}.history.json", stem)),
            state: state_dir.join(format!("{}.state.json", stem)),
        })
    }
}

fn file_stem(name: &str, profile: Option<&str>) -> String {
    match profile {
        Some(profile) if !profile.is_empty() => format!("{}-{}", name, profile),
        _ => name.to_string(),
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
///
/// `CHORUS_CONFIG` overrides the location entirely.
pub fn resolve_config_path(name: &str, profile: Option<&str>) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHORUS_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir
        .join("chorus")
        .join(format!("{}.toml", file_stem(name, profile))))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("chorus"))
}

/// Durations as human-readable strings ("1h", "5m 30s")
mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
