//! OCPP wire frame codec (decode-once).
//!
//! A frame arrives as JSON text, or as binary that is base64-encoded into a
//! string before JSON decoding. The decoded JSON is either a bare OCPP array
//! (`[2, id, action, payload]` and friends) or an inter-node forwarding
//! envelope `{"ocpp": [...], "meta": {...}}`. Which of the two it was is
//! decided exactly once here and never re-inspected downstream.
//!
//! Parsing rules:
//! - Never index into the array; length-checked access only.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use std::borrow::Cow;

use base64::Engine;
use bytes::Bytes;
use serde_json::value::RawValue;
use serde_json::{json, Map, Value};

use crate::error::{CsmsError, OcppErrorCode, Result};

/// MessageTypeId for a Call frame.
pub const MESSAGE_TYPE_CALL: u64 = 2;
/// MessageTypeId for a CallResult frame.
pub const MESSAGE_TYPE_CALL_RESULT: u64 = 3;
/// MessageTypeId for a CallError frame.
pub const MESSAGE_TYPE_CALL_ERROR: u64 = 4;

/// Raw websocket payload handed to the codec.
#[derive(Debug, Clone)]
pub enum RawFrame {
    Text(String),
    Binary(Bytes),
}

/// The textual form of a raw frame: text passes through unchanged, binary is
/// base64-encoded. This is also the exact representation the forwarding layer
/// relays verbatim.
pub fn raw_text(raw: &RawFrame) -> Cow<'_, str> {
    match raw {
        RawFrame::Text(s) => Cow::Borrowed(s),
        RawFrame::Binary(b) => Cow::Owned(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}

/// Routing context carried between cooperating nodes (origin node, hop count).
/// Never exposed to the charge point.
pub type ForwardingMeta = Map<String, Value>;

/// Typed view over an OCPP frame array.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        unique_id: String,
        payload: Value,
    },
    CallError {
        unique_id: String,
        code: String,
        description: String,
        details: Value,
    },
    /// Well-formed JSON array whose MessageTypeId is not 2/3/4. The session
    /// drops these without closing the connection.
    Other(Vec<Value>),
}

impl OcppFrame {
    /// The correlation token, when the frame kind carries one.
    pub fn unique_id(&self) -> Option<&str> {
        match self {
            OcppFrame::Call { unique_id, .. }
            | OcppFrame::CallResult { unique_id, .. }
            | OcppFrame::CallError { unique_id, .. } => Some(unique_id),
            OcppFrame::Other(_) => None,
        }
    }
}

/// Decode output: the frame plus where it came from.
#[derive(Debug, Clone)]
pub enum ParsedInput {
    /// Frame arrived directly from a charge point.
    Bare(OcppFrame),
    /// Frame arrived wrapped in a forwarding envelope from a peer node.
    Forwarded {
        frame: OcppFrame,
        meta: Option<ForwardingMeta>,
    },
}

impl ParsedInput {
    pub fn frame(&self) -> &OcppFrame {
        match self {
            ParsedInput::Bare(frame) | ParsedInput::Forwarded { frame, .. } => frame,
        }
    }

    pub fn into_frame(self) -> OcppFrame {
        match self {
            ParsedInput::Bare(frame) | ParsedInput::Forwarded { frame, .. } => frame,
        }
    }

    pub fn forwarding_meta(&self) -> Option<&ForwardingMeta> {
        match self {
            ParsedInput::Bare(_) => None,
            ParsedInput::Forwarded { meta, .. } => meta.as_ref(),
        }
    }
}

/// Decode one inbound payload.
///
/// Failures are reported as [`CsmsError::ParseFailure`]; the caller decides
/// whether to drop the frame or answer with a protocol error, but must never
/// crash or close the connection because of one.
pub fn decode(raw: &RawFrame) -> Result<ParsedInput> {
    let text = raw_text(raw);
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| CsmsError::ParseFailure(format!("invalid json: {e}")))?;

    match value {
        Value::Array(items) => Ok(ParsedInput::Bare(frame_from_items(items)?)),
        Value::Object(mut obj) => {
            // Forwarding envelope: requires a non-empty array under "ocpp".
            let items = match obj.remove("ocpp") {
                Some(Value::Array(items)) if !items.is_empty() => items,
                _ => {
                    return Err(CsmsError::ParseFailure(
                        "object frame is not a forwarding envelope".into(),
                    ))
                }
            };
            // "meta" is kept only when it is itself an object.
            let meta = match obj.remove("meta") {
                Some(Value::Object(m)) => Some(m),
                _ => None,
            };
            Ok(ParsedInput::Forwarded {
                frame: frame_from_items(items)?,
                meta,
            })
        }
        other => Err(CsmsError::ParseFailure(format!(
            "frame is neither array nor envelope: {other}"
        ))),
    }
}

fn frame_from_items(items: Vec<Value>) -> Result<OcppFrame> {
    let type_id = items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| CsmsError::ParseFailure("missing or non-integer MessageTypeId".into()))?;

    match type_id {
        MESSAGE_TYPE_CALL => {
            // A Call without at least an Action field is malformed.
            if items.len() < 3 {
                return Err(CsmsError::ParseFailure(format!(
                    "Call frame too short: {} elements",
                    items.len()
                )));
            }
            let unique_id = string_at(&items, 1, "UniqueId")?;
            let action = string_at(&items, 2, "Action")?;
            let payload = items.get(3).cloned().unwrap_or(Value::Null);
            Ok(OcppFrame::Call {
                unique_id,
                action,
                payload,
            })
        }
        MESSAGE_TYPE_CALL_RESULT => {
            if items.len() < 3 {
                return Err(CsmsError::ParseFailure(format!(
                    "CallResult frame too short: {} elements",
                    items.len()
                )));
            }
            let unique_id = string_at(&items, 1, "UniqueId")?;
            let payload = items.get(2).cloned().unwrap_or(Value::Null);
            Ok(OcppFrame::CallResult { unique_id, payload })
        }
        MESSAGE_TYPE_CALL_ERROR => {
            if items.len() < 4 {
                return Err(CsmsError::ParseFailure(format!(
                    "CallError frame too short: {} elements",
                    items.len()
                )));
            }
            let unique_id = string_at(&items, 1, "UniqueId")?;
            let code = string_at(&items, 2, "ErrorCode")?;
            let description = string_at(&items, 3, "ErrorDescription")?;
            let details = items.get(4).cloned().unwrap_or(Value::Null);
            Ok(OcppFrame::CallError {
                unique_id,
                code,
                description,
                details,
            })
        }
        _ => Ok(OcppFrame::Other(items)),
    }
}

fn string_at(items: &[Value], idx: usize, what: &str) -> Result<String> {
    items
        .get(idx)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CsmsError::ParseFailure(format!("{what} is missing or not a string")))
}

/// Encode a Call frame as plain JSON.
pub fn encode_call(unique_id: &str, action: &str, payload: &Value) -> String {
    json!([MESSAGE_TYPE_CALL, unique_id, action, payload]).to_string()
}

/// Encode a CallResult frame as plain JSON.
pub fn encode_call_result(unique_id: &str, payload: &Value) -> String {
    json!([MESSAGE_TYPE_CALL_RESULT, unique_id, payload]).to_string()
}

/// Encode a CallError frame as plain JSON.
pub fn encode_call_error(
    unique_id: &str,
    code: OcppErrorCode,
    description: &str,
    details: &Value,
) -> String {
    json!([
        MESSAGE_TYPE_CALL_ERROR,
        unique_id,
        code.as_str(),
        description,
        details
    ])
    .to_string()
}

/// Encode a typed frame back to its wire form. Inverse of [`decode`] for bare
/// frames; never re-wraps in a forwarding envelope.
pub fn encode_frame(frame: &OcppFrame) -> String {
    match frame {
        OcppFrame::Call {
            unique_id,
            action,
            payload,
        } => encode_call(unique_id, action, payload),
        OcppFrame::CallResult { unique_id, payload } => encode_call_result(unique_id, payload),
        OcppFrame::CallError {
            unique_id,
            code,
            description,
            details,
        } => json!([
            MESSAGE_TYPE_CALL_ERROR,
            unique_id,
            code,
            description,
            details
        ])
        .to_string(),
        OcppFrame::Other(items) => Value::Array(items.clone()).to_string(),
    }
}

#[derive(serde::Serialize)]
struct ForwardEnvelope<'a> {
    ocpp: &'a RawValue,
    meta: &'a ForwardingMeta,
}

/// Wrap an already-encoded frame in a forwarding envelope. The frame text is
/// embedded verbatim (`RawValue`), not round-tripped through a JSON tree.
pub fn encode_forwarded(raw_frame: &str, meta: &ForwardingMeta) -> Result<String> {
    let ocpp: &RawValue = serde_json::from_str(raw_frame)
        .map_err(|e| CsmsError::Internal(format!("frame is not valid json: {e}")))?;
    serde_json::to_string(&ForwardEnvelope { ocpp, meta })
        .map_err(|e| CsmsError::Internal(format!("envelope encode failed: {e}")))
}
