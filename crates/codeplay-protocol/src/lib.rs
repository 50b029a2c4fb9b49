//! CodePlay Protocol - Wire protocol for hub communication
//!
//! This crate provides message types and line framing for communication
//! between client sync agents and the broadcast hub. Messages are JSON
//! objects, one per line, over a persistent TCP connection.

pub mod codec;
pub mod message;
pub mod version;

pub use codec::{
    decode_line, encode_line, read_line, write_line, write_message, ProtocolError, MAX_LINE_BYTES,
};
pub use message::{error_code, ClientMessage, MessageType, ServerMessage};
pub use version::ProtocolVersion;
