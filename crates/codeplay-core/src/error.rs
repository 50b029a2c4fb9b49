//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur validating locally produced session input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Chat text is empty or whitespace only
    #[error("Chat message is blank")]
    BlankChat,

    /// Chat text exceeds the emit limit
    #[error("Chat message too long: {len} bytes (max: {max})")]
    ChatTooLong { len: usize, max: usize },

    /// Language identifier is empty or whitespace only
    #[error("Language identifier is blank")]
    BlankLanguage,
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_too_long_display() {
        let err = DomainError::ChatTooLong { len: 40_000, max: 32_768 };
        assert!(err.to_string().contains("40000"));
        assert!(err.to_string().contains("32768"));
    }
}
