//! JSON message protocol.
//!
//! Every frame is an envelope `{"type": <string>, "data": <any>}`.
//!
//! | Inbound            | `data`        | Reply                                       |
//! |--------------------|---------------|---------------------------------------------|
//! | `get_info`         | ignored       | `{"type":"info","data":{"type":"file","path":..}}` |
//! | `get_file_content` | path string   | `{"type":"file_content","data":<text>}`     |
//! | `ping`             | ignored       | `{"type":"pong"}`                           |
//!
//! Change records are pushed as `{"type":"log","data":{"path","op","line_changes"}}`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tailscope_watcher::{ChangeRecord, read_file_content};
use tracing::debug;

use crate::context::AppContext;
use crate::error::ProtocolError;

/// Inbound envelope before dispatch on `type`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    data: serde_json::Value,
}

/// Outbound messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Info(WatchInfo<'a>),
    FileContent(String),
    Pong,
    Error(String),
    Log(&'a ChangeRecord),
}

/// Payload of an `info` reply.
#[derive(Debug, Serialize)]
pub struct WatchInfo<'a> {
    /// Always `"file"`; clients do not distinguish directory targets.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: &'a Path,
}

impl ServerMessage<'_> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Answer one inbound text frame.
pub async fn handle_message(ctx: &AppContext, text: &str) -> Result<String, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    debug!(kind = %envelope.kind, "Handling request");

    let reply = match envelope.kind.as_str() {
        "get_info" => ServerMessage::Info(WatchInfo {
            kind: "file",
            path: ctx.target.path(),
        }),
        "get_file_content" => {
            let serde_json::Value::String(path) = envelope.data else {
                return Err(ProtocolError::InvalidData {
                    kind: "get_file_content",
                    expected: "a file path string",
                });
            };
            let (content, _) = read_file_content(Path::new(&path), &ctx.watcher_config).await?;
            ServerMessage::FileContent(content)
        }
        "ping" => ServerMessage::Pong,
        _ => return Err(ProtocolError::UnknownType(envelope.kind)),
    };

    reply.to_json().map_err(ProtocolError::Encode)
}

/// Encode a change record as a `log` push.
pub fn encode_change(record: &ChangeRecord) -> Result<String, serde_json::Error> {
    ServerMessage::Log(record).to_json()
}

/// Encode an error frame for a failed request.
pub fn encode_error(error: &ProtocolError) -> Result<String, serde_json::Error> {
    ServerMessage::Error(error.to_string()).to_json()
}
