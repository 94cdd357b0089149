//! Post-processing of generated alt text.

/// Hard cap on alt text length, in Unicode code points.
pub const MAX_ALT_TEXT_CHARS: usize = 125;
const ELLIPSIS: &str = "...";

const QUOTES: &[char] = &['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

/// Trim whitespace and any quote characters wrapping the completion.
#[must_use]
pub fn strip_wrapping(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || QUOTES.contains(&c))
}

/// Cap at [`MAX_ALT_TEXT_CHARS`]: longer text keeps its first 122 code points
/// followed by `...`.
#[must_use]
pub fn truncate_alt_text(text: &str) -> String {
    if text.chars().count() <= MAX_ALT_TEXT_CHARS {
        return text.to_string();
    }
    let keep = MAX_ALT_TEXT_CHARS - ELLIPSIS.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Completion text as stored on a suggestion.
#[must_use]
pub fn finalize_alt_text(raw: &str) -> String {
    truncate_alt_text(strip_wrapping(raw))
}

/// Text safe to write onto an image: control characters removed, whitespace
/// runs collapsed to single spaces.
#[must_use]
pub fn sanitize_alt_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `max_words` words, with `...` when anything was cut.
#[must_use]
pub fn trim_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    format!("{}...", words[..max_words].join(" "))
}
