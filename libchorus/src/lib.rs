//! Chorus - scheduled content publishing for social bots
//!
//! This library provides the publishing layer of a bot: one logical post,
//! fitted and delivered to every configured network, with duplicate
//! detection and rate-limit-aware sessions.

pub mod auth;
pub mod backends;
pub mod bot;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod fit;
pub mod logging;
pub mod media;
pub mod segment;
pub mod state;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use backends::{Backend, BackendLimits};
pub use bot::{Bot, ContentGenerator, CycleOutcome};
pub use config::Config;
pub use dedup::DedupCache;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{ChorusError, PlatformError, Result};
pub use media::Image;
pub use state::StateStore;
pub use types::{GeoPoint, ImageMimeType, PostRef, PostRequest, ReplyRef, ReplyStyle, StrongRef};
