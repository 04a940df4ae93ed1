//! Small text utilities shared across the workspace.

/// Clip `s` to at most `max_chars` characters, appending an ellipsis
/// marker when truncation happened.
///
/// Operates on `char` boundaries, so multi-byte input never panics.
#[must_use]
pub fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let clipped: String = s.chars().take(max_chars).collect();
    format!("{clipped}… [truncated]")
}

/// Returns the first non-empty line of `s`, trimmed.
///
/// Used when a one-line summary of a longer payload is wanted for logs.
#[must_use]
pub fn first_line(s: &str) -> &str {
    s.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// Strip a Markdown code fence from around `s`, if present.
///
/// Model output frequently wraps generated SQL or Python in a fenced
/// block (` ```sql ... ``` `). The fence language tag, if any, is
/// discarded. Input without a fence is returned trimmed but otherwise
/// unchanged.
#[must_use]
pub fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line.
    match body.split_once('\n') {
        Some((first, remainder)) if !first.trim().contains(' ') => remainder.trim(),
        _ => body.trim(),
    }
}
