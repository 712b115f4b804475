use crate::db_types::MessageBody;

/// Conversation previews are cut to this many characters.
pub const PREVIEW_MAX_CHARS: usize = 100;
/// Shown in place of the content of an end-to-end encrypted message.
pub const ENCRYPTED_PREVIEW: &str = "🔒 Encrypted message";

/// The short text stored on a conversation to describe its latest message.
pub fn message_preview(body: &MessageBody) -> String {
    match body {
        MessageBody::Plain { text } => truncate_preview(text),
        MessageBody::Encrypted { .. } => ENCRYPTED_PREVIEW.to_string(),
    }
}

/// Trims `text` and cuts it to [`PREVIEW_MAX_CHARS`] characters, marking the cut with an ellipsis.
pub fn truncate_preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{cut}…")
    }
}
