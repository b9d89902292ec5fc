//! Error types for Chorus

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChorusError>;

#[derive(Error, Debug)]
pub enum ChorusError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Content generation failed: {0}")]
    Generation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ChorusError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ChorusError::InvalidInput(_) => 3,
            ChorusError::Platform(PlatformError::Authentication(_)) => 2,
            ChorusError::Platform(_) => 1,
            ChorusError::Config(_) => 1,
            ChorusError::State(_) => 1,
            ChorusError::Image(_) => 1,
            ChorusError::Generation(_) => 1,
        }
    }

    /// Whether this error is a per-backend post failure.
    ///
    /// Post failures are isolated by the dispatcher: they are logged and the
    /// fan-out continues with the next backend. Authentication failures and
    /// every non-platform error abort the whole cycle instead.
    pub fn is_post_failure(&self) -> bool {
        match self {
            ChorusError::Platform(PlatformError::Authentication(_)) => false,
            ChorusError::Platform(_) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    WriteError(#[from] toml::ser::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    Version { found: u64, expected: u32 },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Unix timestamp after which the backend accepts requests again
        reset_at: Option<i64>,
    },
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Could not fit image into {max_bytes} bytes (smallest attempt: {smallest} bytes)")]
    CannotFit { max_bytes: usize, smallest: usize },
}

/// Map an HTTP error status from a backend into a [`PlatformError`]
///
/// `reset_at` is only consulted for 429 responses and should carry whatever
/// reset timestamp the backend advertised in its response headers.
pub fn map_http_status(
    backend: &str,
    context: &str,
    status: u16,
    body: &str,
    reset_at: Option<i64>,
) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Authentication(format!(
            "{} authentication failed ({}): HTTP {} {}",
            backend, context, status, body
        )),
        400 | 413 | 422 => PlatformError::Validation(format!(
            "{} rejected the request ({}): HTTP {} {}",
            backend, context, status, body
        )),
        429 => PlatformError::RateLimit {
            message: format!("{} rate limit exceeded ({}): {}", backend, context, body),
            reset_at,
        },
        500..=599 => PlatformError::Network(format!(
            "{} server error ({}): HTTP {} {}",
            backend, context, status, body
        )),
        _ => PlatformError::Posting(format!(
            "{} request failed ({}): HTTP {} {}",
            backend, context, status, body
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = ChorusError::InvalidInput("Empty candidate list".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = ChorusError::Platform(PlatformError::Authentication("bad password".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let posting = ChorusError::Platform(PlatformError::Posting("timeout".to_string()));
        assert_eq!(posting.exit_code(), 1);

        let generation = ChorusError::Generation("no output".to_string());
        assert_eq!(generation.exit_code(), 1);

        let config = ChorusError::Config(ConfigError::MissingField("bluesky.email".to_string()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_post_failure_classification() {
        assert!(ChorusError::Platform(PlatformError::Posting("x".to_string())).is_post_failure());
        assert!(ChorusError::Platform(PlatformError::Network("x".to_string())).is_post_failure());
        assert!(ChorusError::Platform(PlatformError::Validation("x".to_string())).is_post_failure());
        assert!(ChorusError::Platform(PlatformError::RateLimit {
            message: "x".to_string(),
            reset_at: None,
        })
        .is_post_failure());

        assert!(!ChorusError::Platform(PlatformError::Authentication("x".to_string()))
            .is_post_failure());
        assert!(!ChorusError::InvalidInput("x".to_string()).is_post_failure());
        assert!(!ChorusError::Generation("x".to_string()).is_post_failure());
    }

    #[test]
    fn test_error_message_formatting() {
        let error = ChorusError::Platform(PlatformError::Posting("relay down".to_string()));
        assert_eq!(error.to_string(), "Platform error: Posting failed: relay down");

        let error = ChorusError::Platform(PlatformError::RateLimit {
            message: "slow down".to_string(),
            reset_at: Some(42),
        });
        assert_eq!(error.to_string(), "Platform error: Rate limit exceeded: slow down");
    }

    #[test]
    fn test_state_version_error_formatting() {
        let error = StateError::Version { found: 9, expected: 1 };
        assert_eq!(error.to_string(), "Unsupported snapshot version 9 (expected 1)");
    }

    #[test]
    fn test_map_http_status() {
        assert!(matches!(
            map_http_status("Bluesky", "login", 401, "", None),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            map_http_status("Mastodon", "post", 422, "too long", None),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            map_http_status("Mastodon", "post", 503, "", None),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            map_http_status("Mastodon", "post", 404, "", None),
            PlatformError::Posting(_)
        ));

        match map_http_status("Bluesky", "login", 429, "RateLimitExceeded", Some(1_700_000_000)) {
            PlatformError::RateLimit { message, reset_at } => {
                assert!(message.contains("Bluesky"));
                assert_eq!(reset_at, Some(1_700_000_000));
            }
            other => panic!("Expected RateLimit error, got {:?}", other),
        }
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
