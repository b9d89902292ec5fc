//! Thread segmentation for wrapped posts
//!
//! A wrapped post that exceeds a backend's length limit is split on word
//! boundaries into fragments, posted as a reply chain:
//!
//! ```text
//! "first part…"  <-  "…second part"  <-  "…third part"
//! ```
//!
//! The first fragment carries a trailing ellipsis, every later fragment a
//! leading one. Images only ride on the first fragment.

use textwrap::core::Fragment;
use textwrap::wrap_algorithms::wrap_first_fit;
use tracing::{debug, warn};

use crate::backends::{Backend, Status};
use crate::error::Result;
use crate::media::Image;
use crate::types::{GeoPoint, PostRef, ReplyRef};

pub const ELLIPSIS: char = '\u{2026}';

/// A word measured in chars, which is how the networks count post length
///
/// `textwrap::wrap` measures display columns instead, so zero-width and
/// double-width code points would throw the limit off.
#[derive(Debug)]
struct Word<'a> {
    text: &'a str,
    chars: usize,
}

impl<'a> Word<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().count(),
        }
    }
}

impl Fragment for Word<'_> {
    fn width(&self) -> f64 {
        self.chars as f64
    }

    fn whitespace_width(&self) -> f64 {
        1.0
    }

    fn penalty_width(&self) -> f64 {
        0.0
    }
}

/// Split on whitespace, breaking words longer than `width` chars
fn words(text: &str, width: usize) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    for word in text.split_whitespace() {
        let mut rest = word;
        while let Some((at, _)) = rest.char_indices().nth(width) {
            let (head, tail) = rest.split_at(at);
            words.push(Word::new(head));
            rest = tail;
        }
        words.push(Word::new(rest));
    }
    words
}

/// Split `text` into fragments of at most `limit` characters each
///
/// Text that already fits is returned unchanged as a single fragment.
/// Otherwise it is wrapped into lines of `limit - ellipsis_cost` characters,
/// words longer than a line are broken, and the ellipsis markers are added.
pub fn segment(text: &str, limit: usize, ellipsis_cost: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let width = limit.saturating_sub(ellipsis_cost).max(1);

    // Whitespace, newlines included, only separates words here
    let words = words(text, width);
    let lines: Vec<String> = wrap_first_fit(&words[..], &[width as f64])
        .into_iter()
        .map(|line| {
            line.iter()
                .map(|word| word.text)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let count = lines.len();
    lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| match index {
            0 if count > 1 => format!("{}{}", line, ELLIPSIS),
            0 => line,
            _ => format!("{}{}", ELLIPSIS, line),
        })
        .collect()
}

/// Tracks the reply target for each successive fragment of a thread
#[derive(Debug, Clone, Default)]
pub struct ReplyChain {
    current: Option<ReplyRef>,
}

impl ReplyChain {
    /// Start a chain; the first fragment replies to `initial`, if any
    pub fn new(initial: Option<ReplyRef>) -> Self {
        Self { current: initial }
    }

    /// The reference the next fragment should reply to
    pub fn current(&self) -> Option<&ReplyRef> {
        self.current.as_ref()
    }

    /// Record the result of posting a fragment
    ///
    /// Flat ids simply become the next target. Record references open a new
    /// `{root, parent}` pair after the first fragment, and afterwards keep the
    /// root while moving the parent forward.
    pub fn advance(&mut self, posted: &PostRef, first: bool) {
        let next = match (posted, self.current.take()) {
            (PostRef::Record(record), Some(ReplyRef::Thread { root, .. })) if !first => {
                ReplyRef::Thread {
                    root,
                    parent: record.clone(),
                }
            }
            (posted, _) => posted.as_reply(),
        };
        self.current = Some(next);
    }
}

/// Post `text` to `backend` as a wrapped thread
///
/// Returns the reference of the last fragment posted. When the backend skips
/// a fragment (not connected), the thread stops there.
pub async fn post_thread<B: Backend + ?Sized>(
    backend: &mut B,
    text: &str,
    images: &[Image],
    geo: Option<GeoPoint>,
    reply_to: Option<ReplyRef>,
) -> Result<Option<PostRef>> {
    let limits = backend.limits();
    let limit = limits.text_limit(!images.is_empty());
    let fragments = segment(text, limit, limits.ellipsis_length);

    debug!(
        backend = backend.name(),
        fragments = fragments.len(),
        "Posting wrapped status"
    );

    let mut chain = ReplyChain::new(reply_to);
    let mut last = None;

    for (index, fragment) in fragments.iter().enumerate() {
        let first = index == 0;
        let status = Status {
            text: fragment,
            images: if first { images } else { &[] },
            geo,
            reply_to: chain.current(),
        };

        let posted = match backend.send(status).await? {
            Some(posted) => posted,
            None => {
                if !first {
                    warn!(
                        backend = backend.name(),
                        posted = index,
                        total = fragments.len(),
                        "Thread interrupted, remaining fragments not posted"
                    );
                }
                return Ok(last);
            }
        };

        chain.advance(&posted, first);
        last = Some(posted);
    }

    Ok(last)
}
