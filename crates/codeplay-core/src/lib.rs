//! CodePlay Core - Shared types for live session sync
//!
//! This crate provides the domain types shared between
//! the hub daemon (codeplayd) and the client sync agent (codeplay-client).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod chat;
pub mod connection;
pub mod error;
pub mod language;

// Re-exports for convenience
pub use chat::{validate_chat_text, MAX_CHAT_BYTES};
pub use connection::{ConnectionId, CONNECTION_ID_PREFIX};
pub use error::{DomainError, DomainResult};
pub use language::{Language, LanguageId, UNKNOWN_LANGUAGE_LABEL};
