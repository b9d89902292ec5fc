//! Core types for Chorus

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ChorusError, Result};
use crate::media::Image;

/// Per-backend reply targets, keyed by backend name
pub type ReplyTargets = BTreeMap<String, ReplyRef>;

/// A single logical post, delivered to every configured backend
///
/// Carries one or more candidate texts. Candidates are alternative phrasings
/// of the same content: exactly one of them is published, or, for a wrapped
/// request, the single candidate is split into a thread.
#[derive(Debug, Clone)]
pub struct PostRequest {
    candidates: Vec<String>,
    images: Vec<Image>,
    geo: Option<GeoPoint>,
    reply_to: ReplyTargets,
    wrap: bool,
}

impl PostRequest {
    /// Create a request with a single candidate text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![text.into()],
            images: Vec::new(),
            geo: None,
            reply_to: ReplyTargets::new(),
            wrap: false,
        }
    }

    /// Create a request from several alternative candidate texts
    ///
    /// # Errors
    ///
    /// Returns `ChorusError::InvalidInput` if `candidates` is empty.
    pub fn with_candidates(candidates: Vec<String>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(ChorusError::InvalidInput(
                "Cannot supply an empty candidate list".to_string(),
            ));
        }

        Ok(Self {
            candidates,
            ..Self::new(String::new())
        })
    }

    /// Mark the request as a wrapped post (split into a thread when too long)
    ///
    /// # Errors
    ///
    /// Returns `ChorusError::InvalidInput` if the request has more than one
    /// candidate; wrapping and alternatives are mutually exclusive.
    pub fn wrapped(mut self) -> Result<Self> {
        if self.candidates.len() != 1 {
            return Err(ChorusError::InvalidInput(
                "Cannot mix wrap and a candidate list".to_string(),
            ));
        }
        self.wrap = true;
        Ok(self)
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.geo = Some(GeoPoint {
            latitude,
            longitude,
        });
        self
    }

    /// Reply to an existing post on one backend
    pub fn in_reply_to(mut self, backend: impl Into<String>, target: ReplyRef) -> Self {
        self.reply_to.insert(backend.into(), target);
        self
    }

    /// Check the candidate/wrap invariants
    pub fn validate(&self) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(ChorusError::InvalidInput(
                "Cannot supply an empty candidate list".to_string(),
            ));
        }
        if self.wrap && self.candidates.len() != 1 {
            return Err(ChorusError::InvalidInput(
                "Cannot mix wrap and a candidate list".to_string(),
            ));
        }
        Ok(())
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The primary candidate (the first one supplied)
    pub fn text(&self) -> &str {
        self.candidates.first().map(String::as_str).unwrap_or_default()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn geo(&self) -> Option<GeoPoint> {
        self.geo
    }

    pub fn wrap(&self) -> bool {
        self.wrap
    }

    pub fn reply_target(&self, backend: &str) -> Option<&ReplyRef> {
        self.reply_to.get(backend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A content-addressed record reference (AT Protocol style)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

/// What a backend hands back after a successful post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostRef {
    /// A flat status identifier (Mastodon)
    Id { id: String },
    /// A record reference (Bluesky)
    Record(StrongRef),
}

impl PostRef {
    pub fn id(id: impl Into<String>) -> Self {
        PostRef::Id { id: id.into() }
    }

    /// Reply reference targeting this post as the start of a new thread
    pub fn as_reply(&self) -> ReplyRef {
        match self {
            PostRef::Id { id } => ReplyRef::Id(id.clone()),
            PostRef::Record(record) => ReplyRef::Thread {
                root: record.clone(),
                parent: record.clone(),
            },
        }
    }
}

/// Everything a backend needs to reply to an earlier post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyRef {
    Id(String),
    Thread { root: StrongRef, parent: StrongRef },
}

/// Which [`ReplyRef`] shape a backend produces and accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStyle {
    FlatId,
    RootParent,
}

impl ReplyStyle {
    pub fn accepts(&self, reply: &ReplyRef) -> bool {
        matches!(
            (self, reply),
            (ReplyStyle::FlatId, ReplyRef::Id(_)) | (ReplyStyle::RootParent, ReplyRef::Thread { .. })
        )
    }
}

/// Supported image MIME types for attachments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
