/// Maximum length of a configured summary prompt, in characters.
pub const MAX_PROMPT_LEN: usize = 2000;

/// Cleans a configured prompt before it is sent to a provider.
///
/// Control characters other than newlines and tabs are removed, the result
/// is trimmed and hard-truncated to [`MAX_PROMPT_LEN`] characters. A prompt
/// that ends up empty is replaced by `default`.
#[must_use]
pub fn normalize_prompt(raw: &str, default: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .take(MAX_PROMPT_LEN)
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Removes control characters from a single-line value such as a subject.
#[must_use]
pub fn single_line(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
