//! Newline-delimited JSON framing.
//!
//! Every message is one JSON object on one line. The transport guarantees
//! ordering and reliability, so framing is the only thing layered on top.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::version::ProtocolVersion;

/// Maximum length of one line, newline included (64 KiB).
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Errors produced while framing or parsing protocol lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Protocol version mismatch: local {local}, peer {peer}")]
    VersionMismatch {
        local: ProtocolVersion,
        peer: ProtocolVersion,
    },

    #[error("Line too large: {size} bytes (max: {max})")]
    LineTooLarge { size: usize, max: usize },

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    Eof,
}

/// Serializes `msg` into a single line, trailing newline included.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Parses one line (with or without its trailing newline).
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLarge {
            size: line.len(),
            max: MAX_LINE_BYTES,
        });
    }
    Ok(serde_json::from_str(line.trim_end_matches(['\n', '\r']))?)
}

/// Reads the next line into `buf` (cleared first).
///
/// Returns `ProtocolError::Eof` when the peer closed the stream. At most
/// [`MAX_LINE_BYTES`] are buffered: the rest of a longer line is consumed
/// and discarded, then reported as `LineTooLarge`, so the stream stays
/// aligned on the next message. Bytes that are not UTF-8 are reported as
/// `InvalidUtf8` once the whole line has been consumed.
pub async fn read_line<R>(reader: &mut R, buf: &mut String) -> Result<(), ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut bytes = Vec::new();
    let mut size = 0usize;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if size == 0 {
                return Err(ProtocolError::Eof);
            }
            // Final line without a newline.
            break;
        }

        let (take, done) = match available.iter().position(|b| *b == b'\n') {
            Some(newline) => (newline + 1, true),
            None => (available.len(), false),
        };

        if size + take <= MAX_LINE_BYTES {
            if let Some(chunk) = available.get(..take) {
                bytes.extend_from_slice(chunk);
            }
        } else {
            bytes.clear();
        }
        size += take;
        reader.consume(take);

        if done {
            break;
        }
    }

    if size > MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLarge {
            size,
            max: MAX_LINE_BYTES,
        });
    }

    *buf = String::from_utf8(bytes)?;
    Ok(())
}

/// Writes an already-encoded line and flushes.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Encodes and writes one message.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(msg)?;
    write_line(writer, &line).await
}
