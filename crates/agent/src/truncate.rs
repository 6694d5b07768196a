//! Tool-result truncation.

/// Appended when a result is cut.
pub const TRUNCATION_MARKER: &str = "\n... [Result truncated due to size]";

/// Keep at most `max_length` characters of `text`, marking the cut.
pub fn truncate_result(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
    }
}
