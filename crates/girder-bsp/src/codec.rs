//! `Content-Length` framing over a byte stream.
//!
//! BSP uses the same base-protocol framing as LSP: a header block terminated
//! by an empty line, then exactly `Content-Length` bytes of JSON.

use crate::rpc::Message;
use serde_json::Value;
use std::io::{BufRead, Write};
use thiserror::Error;

/// Default cap on a single decoded message. Large workspaces can produce big
/// `workspace/buildTargets` payloads, but anything beyond this is a protocol
/// error rather than a legitimate message.
pub const MAX_MESSAGE_BYTES_DEFAULT: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("malformed Content-Length header: {0}")]
    MalformedContentLength(String),

    #[error("message too large: {len} bytes (limit {limit})")]
    MessageTooLarge { len: usize, limit: usize },

    #[error("malformed JSON-RPC payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read one message. Returns `Ok(None)` on a clean EOF at a message boundary;
/// EOF mid-message is an error.
pub fn read_message(
    reader: &mut impl BufRead,
    max_bytes: usize,
) -> Result<Option<Message>, CodecError> {
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            if saw_header {
                return Err(CodecError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed inside a message header",
                )));
            }
            return Ok(None);
        }
        saw_header = true;

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                let len = value
                    .parse::<usize>()
                    .map_err(|_| CodecError::MalformedContentLength(value.to_string()))?;
                content_length = Some(len);
            }
        }
    }

    let len = content_length.ok_or(CodecError::MissingContentLength)?;
    if len > max_bytes {
        return Err(CodecError::MessageTooLarge {
            len,
            limit: max_bytes,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

/// Write one message with the `jsonrpc` version stamp and framing header.
pub fn write_message(writer: &mut impl Write, message: &Message) -> Result<(), CodecError> {
    let mut value = serde_json::to_value(message)?;
    if let Value::Object(object) = &mut value {
        object.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    }
    let json = serde_json::to_vec(&value)?;
    write!(writer, "Content-Length: {}\r\n\r\n", json.len())?;
    writer.write_all(&json)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Notification, Request, RequestId};
    use std::io::Cursor;

    #[test]
    fn round_trips_through_the_framing() {
        let mut buf = Vec::new();
        let message = Message::Request(Request {
            id: RequestId::Number(12),
            method: "buildTarget/compile".to_string(),
            params: serde_json::json!({"targets": []}),
        });
        write_message(&mut buf, &message).unwrap();

        let mut reader = Cursor::new(buf);
        let back = read_message(&mut reader, MAX_MESSAGE_BYTES_DEFAULT)
            .unwrap()
            .unwrap();
        assert_eq!(back, message);
        // Stream exhausted: clean EOF.
        assert!(read_message(&mut reader, MAX_MESSAGE_BYTES_DEFAULT)
            .unwrap()
            .is_none());
    }

    #[test]
    fn stamps_the_jsonrpc_version() {
        let mut buf = Vec::new();
        write_message(
            &mut buf,
            &Message::Notification(Notification {
                method: "build/exit".to_string(),
                params: Value::Null,
            }),
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(r#""jsonrpc":"2.0""#));
    }

    #[test]
    fn rejects_oversized_messages() {
        let payload = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_BYTES_DEFAULT + 1);
        let err = read_message(&mut Cursor::new(payload), MAX_MESSAGE_BYTES_DEFAULT).unwrap_err();
        assert!(matches!(err, CodecError::MessageTooLarge { .. }));
    }

    #[test]
    fn rejects_missing_content_length() {
        let payload = "Content-Type: application/json\r\n\r\n{}";
        let err = read_message(&mut Cursor::new(payload), MAX_MESSAGE_BYTES_DEFAULT).unwrap_err();
        assert!(matches!(err, CodecError::MissingContentLength));
    }

    #[test]
    fn eof_inside_a_header_is_an_error_not_a_clean_close() {
        let payload = "Content-Length: 10\r\n";
        let err = read_message(&mut Cursor::new(payload), MAX_MESSAGE_BYTES_DEFAULT).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
