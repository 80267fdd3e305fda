//! Field helpers for structured logging

use uuid::Uuid;

/// Maximum number of characters kept in a prompt preview.
pub const PROMPT_PREVIEW_CHARS: usize = 100;

/// Generate a new request ID using UUID v4
///
/// The ID correlates every log line, audit record and metric emitted for
/// one dispatch, including its backend attempts.
///
/// # Examples
///
/// ```
/// use switchyard::logging::generate_request_id;
///
/// let request_id = generate_request_id();
/// assert_eq!(request_id.len(), 36);
/// ```
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Privacy-safe prompt preview.
///
/// Returns `None` unless content logging is enabled or when the prompt is
/// empty. Otherwise returns the first [`PROMPT_PREVIEW_CHARS`] characters,
/// with `...` appended when something was cut.
///
/// # Examples
///
/// ```
/// use switchyard::logging::truncate_prompt;
///
/// assert_eq!(truncate_prompt("Hello, world!", true).as_deref(), Some("Hello, world!"));
/// assert_eq!(truncate_prompt("Hello, world!", false), None);
/// ```
pub fn truncate_prompt(prompt: &str, enable_content_logging: bool) -> Option<String> {
    if !enable_content_logging || prompt.is_empty() {
        return None;
    }
    Some(truncate_chars(prompt, PROMPT_PREVIEW_CHARS))
}

/// Truncate on a char boundary.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
