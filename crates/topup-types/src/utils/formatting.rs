//! String formatting utilities.

/// Clips a user-facing message to at most `max_chars` characters.
///
/// Clipped messages end with an ellipsis, which counts towards the limit.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
	if message.chars().count() <= max_chars {
		return message.to_string();
	}
	let kept: String = message.chars().take(max_chars.saturating_sub(1)).collect();
	format!("{}…", kept.trim_end())
}
