//! JSON-RPC envelope codec and NDJSON line framer.
//!
//! [`encode`] / [`decode`] convert between [`Message`] and a single JSON
//! text. [`LineCodec`] wraps [`tokio_util::codec::LinesCodec`] with a
//! configurable maximum line length and plugs the envelope codec into
//! [`FramedRead`](tokio_util::codec::FramedRead) /
//! [`FramedWrite`](tokio_util::codec::FramedWrite) for stream transports.
//!
//! Envelope rules:
//! - `jsonrpc`, when present, must be the string `"2.0"`.
//! - `method` + `id` is a request; `method` alone is a notification.
//! - A response carries an `id` and exactly one of `result` / `error`.

use bytes::BytesMut;
use serde_json::{Map, Value};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::message::{Message, Notification, Request, RequestId, Response, ResponsePayload};
use super::RpcError;
use crate::{AppError, Result};

/// Protocol version string required in the `jsonrpc` field.
pub const JSONRPC_VERSION: &str = "2.0";

/// Maximum line length accepted by [`LineCodec`]: 8 MiB.
///
/// Prompts with embedded resources or images can be large; anything beyond
/// this is treated as a misbehaving peer.
pub const MAX_LINE_BYTES: usize = 8 * 1_048_576;

/// Serialise `message` to its JSON value form.
#[must_use]
pub fn to_value(message: &Message) -> Value {
    let mut obj = Map::new();
    obj.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
    match message {
        Message::Request(req) => {
            obj.insert("id".into(), req.id.to_value());
            obj.insert("method".into(), Value::from(req.method.as_str()));
            if let Some(ref params) = req.params {
                obj.insert("params".into(), params.clone());
            }
        }
        Message::Notification(note) => {
            obj.insert("method".into(), Value::from(note.method.as_str()));
            if let Some(ref params) = note.params {
                obj.insert("params".into(), params.clone());
            }
        }
        Message::Response(resp) => {
            obj.insert("id".into(), resp.id.to_value());
            match resp.payload {
                ResponsePayload::Result(ref result) => {
                    obj.insert("result".into(), result.clone());
                }
                ResponsePayload::Error(ref err) => {
                    obj.insert("error".into(), error_to_value(err));
                }
            }
        }
    }
    Value::Object(obj)
}

/// Parse a JSON value into a [`Message`], validating the envelope.
///
/// # Errors
///
/// Returns [`AppError::Codec`] when the value is not an object, the
/// `jsonrpc` field is present but not `"2.0"`, the id is not an integer or
/// string, or a response carries neither or both of `result` / `error`.
pub fn from_value(value: Value) -> Result<Message> {
    let Value::Object(mut obj) = value else {
        return Err(AppError::Codec("envelope must be a JSON object".into()));
    };

    if let Some(version) = obj.get("jsonrpc") {
        if version.as_str() != Some(JSONRPC_VERSION) {
            return Err(AppError::Codec(format!(
                "unsupported jsonrpc version: {version}"
            )));
        }
    }

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => Some(RequestId::from_value(&raw).ok_or_else(|| {
            AppError::Codec(format!("id must be an integer or a string, got {raw}"))
        })?),
    };

    if let Some(method) = obj.remove("method") {
        let Value::String(method) = method else {
            return Err(AppError::Codec("method must be a string".into()));
        };
        let params = obj.remove("params");
        return Ok(match id {
            Some(id) => Message::Request(Request { id, method, params }),
            None => Message::Notification(Notification { method, params }),
        });
    }

    let Some(id) = id else {
        return Err(AppError::Codec(
            "envelope has neither method nor id".into(),
        ));
    };

    let payload = match (obj.remove("result"), obj.remove("error")) {
        (Some(result), None) => ResponsePayload::Result(result),
        (None, Some(error)) => {
            let err: RpcError = serde_json::from_value(error)
                .map_err(|e| AppError::Codec(format!("invalid error object: {e}")))?;
            ResponsePayload::Error(err)
        }
        (Some(_), Some(_)) => {
            return Err(AppError::Codec(
                "response must not carry both result and error".into(),
            ))
        }
        (None, None) => {
            return Err(AppError::Codec(
                "response must carry result or error".into(),
            ))
        }
    };

    Ok(Message::Response(Response { id, payload }))
}

/// Encode `message` as compact single-line JSON (no trailing newline).
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialisation fails.
pub fn encode(message: &Message) -> Result<String> {
    serde_json::to_string(&to_value(message))
        .map_err(|e| AppError::Codec(format!("failed to serialise message: {e}")))
}

/// Decode a single JSON text into a [`Message`].
///
/// # Errors
///
/// Returns [`AppError::Codec`] for malformed JSON or an invalid envelope.
pub fn decode(text: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| AppError::Codec(format!("malformed json: {e}")))?;
    from_value(value)
}

/// Error reply for a frame that failed to [`decode`].
///
/// Malformed JSON answers with `-32700`; well-formed JSON that is not a valid
/// envelope answers with `-32600`. The reply carries a `null` id because the
/// offending request could not be identified, and `detail` goes into `data`.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialisation fails.
pub fn rejection(text: &str, detail: &AppError) -> Result<String> {
    let error = if serde_json::from_str::<Value>(text).is_err() {
        RpcError::parse_error("parse error")
    } else {
        RpcError::invalid_request("invalid request")
    }
    .with_data(Value::from(detail.to_string()));

    let mut obj = Map::new();
    obj.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
    obj.insert("id".into(), Value::Null);
    obj.insert("error".into(), error_to_value(&error));
    serde_json::to_string(&Value::Object(obj))
        .map_err(|e| AppError::Codec(format!("failed to serialise rejection: {e}")))
}

fn error_to_value(err: &RpcError) -> Value {
    let mut obj = Map::new();
    obj.insert("code".into(), Value::from(err.code));
    obj.insert("message".into(), Value::from(err.message.as_str()));
    if let Some(ref data) = err.data {
        obj.insert("data".into(), data.clone());
    }
    Value::Object(obj)
}

// ── Line framer ───────────────────────────────────────────────────────────────

/// NDJSON framer producing [`Message`]s.
///
/// # Decoder
///
/// Blank or whitespace-only lines are skipped. A line that is not a valid
/// envelope yields [`AppError::Codec`]; lines beyond the maximum length yield
/// [`AppError::Codec`]`("line too long: …")` without allocating.
///
/// # Encoder
///
/// Each message is written as compact JSON followed by a single `\n`.
#[derive(Debug)]
pub struct LineCodec {
    lines: LinesCodec,
    max_length: usize,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line length limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn map_error(&self, e: LinesCodecError) -> AppError {
        match e {
            LinesCodecError::MaxLineLengthExceeded => {
                AppError::Codec(format!("line too long: exceeded {} bytes", self.max_length))
            }
            LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Message;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let line = self.lines.decode(src).map_err(|e| self.map_error(e))?;
            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return decode(line.trim()).map(Some),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let line = self.lines.decode_eof(src).map_err(|e| self.map_error(e))?;
            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return decode(line.trim()).map(Some),
            }
        }
    }
}

impl Encoder<Message> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let text = encode(&item)?;
        self.lines.encode(text, dst).map_err(|e| self.map_error(e))
    }
}
