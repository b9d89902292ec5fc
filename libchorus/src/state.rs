//! Persisted bot state
//!
//! A small versioned JSON document next to the dedup history. It carries the
//! login rate limits of each backend across restarts, plus free-form values
//! a content generator may want to keep between runs.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StateError;

/// Current on-disk format of every snapshot this crate writes
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotState {
    pub version: u32,
    /// Backend name to the unix timestamp its login rate limit expires
    #[serde(default)]
    pub rate_limits: BTreeMap<String, i64>,
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl Default for BotState {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            rate_limits: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }
}

/// File-backed [`BotState`]
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: BotState,
}

impl StateStore {
    /// Load the snapshot at `path`
    ///
    /// Never fails: a missing file starts empty, and an unreadable or
    /// unsupported one is logged and replaced by an empty state.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match read_snapshot::<BotState>(&path) {
            Ok(Some(state)) => {
                debug!(path = %path.display(), "Loaded bot state");
                state
            }
            Ok(None) => BotState::default(),
            Err(e) => {
                warn!(path = %path.display(), "Ignoring unreadable bot state: {}", e);
                BotState::default()
            }
        };
        Self { path, state }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BotState {
        &mut self.state
    }

    /// Replace the remembered rate limits wholesale
    pub fn set_rate_limits(&mut self, rate_limits: BTreeMap<String, i64>) {
        self.state.rate_limits = rate_limits;
    }

    /// Write the snapshot; failures are logged and otherwise ignored
    pub fn save(&self) {
        match write_snapshot(&self.path, &self.state) {
            Ok(()) => debug!(path = %self.path.display(), "Saved bot state"),
            Err(e) => warn!(path = %self.path.display(), "Failed to save bot state: {}", e),
        }
    }
}

/// Read a versioned JSON snapshot, `Ok(None)` if the file does not exist
pub(crate) fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let raw: serde_json::Value = serde_json::from_slice(&bytes)?;
    let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
    if version != u64::from(SNAPSHOT_VERSION) {
        return Err(StateError::Version {
            found: version,
            expected: SNAPSHOT_VERSION,
        });
    }

    Ok(Some(serde_json::from_value(raw)?))
}

/// Write `value` as pretty JSON through a temp file and rename
pub(crate) fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::load(temp_dir.path().join("bot.state.json"));

        assert_eq!(store.state(), &BotState::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("bot.state.json");

        let mut store = StateStore::load(&path);
        store.set_rate_limits(BTreeMap::from([("bluesky".to_string(), 1_700_000_000)]));
        store
            .state_mut()
            .values
            .insert("last_topic".to_string(), serde_json::json!("rust"));
        store.save();

        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = StateStore::load(&path);
        assert_eq!(reloaded.state().rate_limits["bluesky"], 1_700_000_000);
        assert_eq!(reloaded.state().values["last_topic"], "rust");
    }

    #[test]
    fn test_garbage_file_is_empty_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bot.state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = StateStore::load(&path);
        assert!(store.state().rate_limits.is_empty());
    }

    #[test]
    fn test_future_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bot.state.json");
        std::fs::write(&path, r#"{"version": 2, "rate_limits": {"bluesky": 5}}"#).unwrap();

        let result = read_snapshot::<BotState>(&path);
        assert!(matches!(
            result,
            Err(StateError::Version {
                found: 2,
                expected: 1
            })
        ));
        assert!(StateStore::load(&path).state().rate_limits.is_empty());
    }

    #[test]
    fn test_oversized_version_is_not_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bot.state.json");
        // 2^32 + 1 would read as 1 if cut down to 32 bits
        std::fs::write(&path, r#"{"version": 4294967297, "rate_limits": {"bluesky": 5}}"#).unwrap();

        let result = read_snapshot::<BotState>(&path);
        assert!(matches!(
            result,
            Err(StateError::Version {
                found: 4_294_967_297,
                expected: 1
            })
        ));
        assert!(StateStore::load(&path).state().rate_limits.is_empty());
    }

    #[test]
    fn test_save_into_unwritable_location_does_not_panic() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // Parent "directory" is a regular file
        let store = StateStore::load(blocker.join("bot.state.json"));
        store.save();
    }
}
