//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol, plus the
//! per-connection accumulator that decides where a request ends.
//!
//! ## Framing
//!
//! Requests carry no length prefix. After every read the whole buffer is
//! parsed again; the request is complete as soon as it parses as one JSON
//! value. A parse failure at end of input means more bytes are needed, any
//! other parse failure can never recover and rejects the request.

use std::io::Write;

use bytes::BytesMut;
use serde_json::Value;

use super::{Command, Response};
use crate::error::{RelayError, Result};

/// Size of a single socket read
pub const READ_CHUNK_SIZE: usize = 8192;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(command)?)
}

/// Decode a command from a complete envelope
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let value: Value = serde_json::from_slice(bytes)?;
    command_from_value(value)
}

fn command_from_value(value: Value) -> Result<Command> {
    if !value.is_object() {
        return Err(RelayError::InvalidEnvelope(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| RelayError::InvalidEnvelope(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(response)?)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write a response fully and flush it
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Frame Buffer
// =============================================================================

/// Accumulates request bytes for one connection
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_size: usize,
}

impl FrameBuffer {
    /// Create an empty buffer that rejects requests larger than `max_size`
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE.min(max_size)),
            max_size,
        }
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        let size = self.buf.len() + data.len();
        if size > self.max_size {
            return Err(RelayError::RequestTooLarge {
                size,
                max: self.max_size,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse the accumulated bytes as one JSON value
    ///
    /// Returns `Ok(None)` while the value is still incomplete. On success the
    /// buffer is cleared.
    pub fn try_parse(&mut self) -> Result<Option<Value>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        match serde_json::from_slice::<Value>(&self.buf) {
            Ok(value) => {
                self.buf.clear();
                Ok(Some(value))
            }
            Err(e) if e.is_eof() => Ok(None),
            Err(e) => Err(RelayError::MalformedRequest(e.to_string())),
        }
    }

    /// Try to parse the accumulated bytes as a command envelope
    pub fn try_parse_command(&mut self) -> Result<Option<Command>> {
        self.try_parse()?.map(command_from_value).transpose()
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop any buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
