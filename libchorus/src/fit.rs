//! Candidate selection against a backend's length limit

/// Pick the longest candidate strictly shorter than `limit`
///
/// Candidates are visited in ascending order of length (stable, so equal
/// lengths keep their original order) and the last one under the limit wins.
/// When nothing fits, the first candidate is returned as-is: callers that need
/// a hard ceiling must truncate separately, e.g. with
/// [`truncate_with_ellipsis`].
///
/// Lengths are measured in characters.
///
/// # Panics
///
/// Panics if `candidates` is empty. [`crate::PostRequest`] guarantees at least
/// one candidate.
pub fn select_best_fit(candidates: &[String], limit: usize) -> &str {
    let mut picked = candidates[0].as_str();

    let mut by_length: Vec<&String> = candidates.iter().collect();
    by_length.sort_by_key(|candidate| candidate.chars().count());

    for candidate in by_length {
        if candidate.chars().count() < limit {
            picked = candidate;
        }
    }

    picked
}

/// Cut `text` to at most `limit` characters, ending in "..." when shortened
pub fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= 3 {
        return text.chars().take(limit).collect();
    }

    let mut truncated: String = text.chars().take(limit - 3).collect();
    truncated.push_str("...");
    truncated
}
