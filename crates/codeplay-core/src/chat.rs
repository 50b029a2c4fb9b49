//! Chat text rules applied before a message leaves the client.
//!
//! The server forwards any payload verbatim. These checks only guard the
//! emitting side so blank or oversized text never reaches the wire.

use crate::error::{DomainError, DomainResult};

/// Largest chat payload a client will emit, in bytes.
///
/// Keeps a serialized message comfortably under the protocol line limit.
pub const MAX_CHAT_BYTES: usize = 32 * 1024;

/// Checks that `text` may be emitted as a chat message.
///
/// The text itself is sent unmodified; surrounding whitespace is only
/// considered when deciding whether it is blank.
pub fn validate_chat_text(text: &str) -> DomainResult<()> {
    if text.trim().is_empty() {
        return Err(DomainError::BlankChat);
    }
    if text.len() > MAX_CHAT_BYTES {
        return Err(DomainError::ChatTooLong {
            len: text.len(),
            max: MAX_CHAT_BYTES,
        });
    }
    Ok(())
}
