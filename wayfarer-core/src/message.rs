//! Wire shapes exchanged with sessions.
//!
//! The core is transport agnostic: the server crate turns these into
//! WebSocket frames, tests read them straight off the session channel.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entry::Entry;

/// Reserved command names handled by the hub itself.
pub const WATCH_COMMAND: &str = "watch";
/// See [`WATCH_COMMAND`].
pub const UNWATCH_COMMAND: &str = "unwatch";
/// See [`WATCH_COMMAND`].
pub const ABORT_COMMAND: &str = "abort";

/// Generic text sent to a session when its operation process failed.
pub const UNEXPECTED_ERROR: &str = "Unexpected errors occurred.";

/// One request from a session: `(commandName, requestId, parameters)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub command: String,
    pub request_id: String,
    #[serde(default)]
    pub parameters: Value,
}

impl InboundRequest {
    pub fn new(
        command: impl Into<String>,
        request_id: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            command: command.into(),
            request_id: request_id.into(),
            parameters,
        }
    }
}

/// Parameters of the reserved `watch` and `unwatch` commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchParameters {
    pub directory_path: String,
}

/// Terminal status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Finish,
    Error,
    Abort,
}

/// `{status, error?}` plus any command-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CommandResult {
    pub fn finish() -> Self {
        Self {
            status: CommandStatus::Finish,
            error: None,
            fields: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            error: Some(message.into()),
            fields: Map::new(),
        }
    }

    pub fn abort() -> Self {
        Self {
            status: CommandStatus::Abort,
            error: None,
            fields: Map::new(),
        }
    }

    /// Attach a command-specific field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Messages the core emits to exactly one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Full listing of a watched directory.
    #[serde(rename_all = "camelCase")]
    DirectoryUpdate { path: PathBuf, entries: Vec<Entry> },

    /// The subscription for `path` was torn down.
    #[serde(rename_all = "camelCase")]
    Error { path: PathBuf, message: String },

    /// Reply or result payload correlated by request id.
    #[serde(rename_all = "camelCase")]
    Command { request_id: String, result: Value },
}

impl OutboundMessage {
    pub fn command(request_id: impl Into<String>, result: CommandResult) -> Self {
        Self::Command {
            request_id: request_id.into(),
            result: result.into_value(),
        }
    }

    /// Command result when the payload comes verbatim from a worker process.
    pub fn command_payload(request_id: impl Into<String>, payload: Value) -> Self {
        Self::Command {
            request_id: request_id.into(),
            result: payload,
        }
    }
}
