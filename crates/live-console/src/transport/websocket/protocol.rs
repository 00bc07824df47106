//! JSON frames of the console message channel.

use serde::Deserialize;
use serde_json::{Value, json};

pub const ERR_INVALID_FORMAT: &str = "invalid_format";
pub const ERR_UNKNOWN_COMMAND: &str = "unknown_command";
pub const ERR_NOT_FOUND: &str = "not_found";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "console/create_session")]
    CreateSession { session_id: String },
    #[serde(rename = "console/input")]
    Input { session_id: String, data: String },
    #[serde(rename = "console/resize")]
    Resize {
        session_id: String,
        cols: u16,
        rows: u16,
    },
    #[serde(rename = "unsubscribe_events")]
    UnsubscribeEvents { subscription: u64 },
}

const KNOWN_TYPES: [&str; 4] = [
    "console/create_session",
    "console/input",
    "console/resize",
    "unsubscribe_events",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// A frame that could not be turned into a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameError {
    pub id: u64,
    pub code: &'static str,
    pub message: String,
}

impl FrameError {
    fn invalid(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            code: ERR_INVALID_FORMAT,
            message: message.into(),
        }
    }

    pub fn to_frame(&self) -> String {
        error_result(self.id, self.code, &self.message)
    }
}

pub fn parse_request(text: &str) -> Result<Request, FrameError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| FrameError::invalid(0, format!("Message incorrectly formatted: {}", e)))?;
    let id = value
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| FrameError::invalid(0, "Message incorrectly formatted: missing id"))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FrameError::invalid(id, "Message incorrectly formatted: missing type"))?;

    if !KNOWN_TYPES.contains(&kind) {
        return Err(FrameError {
            id,
            code: ERR_UNKNOWN_COMMAND,
            message: format!("Unknown command: {}", kind),
        });
    }

    let command = serde_json::from_value(value)
        .map_err(|e| FrameError::invalid(id, format!("Message incorrectly formatted: {}", e)))?;
    Ok(Request { id, command })
}

pub fn success_result(id: u64) -> String {
    json!({
        "id": id,
        "type": "result",
        "success": true,
        "result": null
    })
    .to_string()
}

pub fn error_result(id: u64, code: &str, message: &str) -> String {
    json!({
        "id": id,
        "type": "result",
        "success": false,
        "error": { "code": code, "message": message }
    })
    .to_string()
}

/// Terminal output for the session created by request `id`.
pub fn output_event(id: u64, text: &str) -> String {
    json!({
        "id": id,
        "type": "event",
        "event": text
    })
    .to_string()
}
