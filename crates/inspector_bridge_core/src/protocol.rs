//! Wire envelopes for the remote-inspection protocol.
//!
//! Outbound commands carry an `id`; inbound frames are either a response
//! (carrying the `id` of the command it answers) or an event (carrying a
//! `method` and no `id`).

use crate::{CdpError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type CommandId = u64;

pub const DEBUGGER_PAUSED: &str = "Debugger.paused";
pub const DEBUGGER_RESUMED: &str = "Debugger.resumed";
pub const HEAP_SNAPSHOT_CHUNK: &str = "HeapProfiler.addHeapSnapshotChunk";
pub const HEAP_SNAPSHOT_PROGRESS: &str = "HeapProfiler.reportHeapSnapshotProgress";

#[derive(Debug, Clone, Serialize)]
pub struct CdpCommand {
    pub id: CommandId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl CdpCommand {
    pub fn new(id: CommandId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: CommandId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

impl CdpResponse {
    /// Converts the envelope into the command outcome. A response without a
    /// `result` member resolves to an empty object.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        Ok(self.result.unwrap_or_else(|| Value::Object(Map::new())))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

/// Classifies one inbound text frame.
pub fn decode_frame(text: &str) -> Result<IncomingMessage> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(CdpError::InvalidResponse(format!(
            "expected a JSON object frame, got: {value}"
        )));
    };

    if object.contains_key("id") {
        Ok(IncomingMessage::Response(serde_json::from_value(value)?))
    } else if object.contains_key("method") {
        Ok(IncomingMessage::Event(serde_json::from_value(value)?))
    } else {
        Err(CdpError::InvalidResponse(
            "frame has neither 'id' nor 'method'".to_string(),
        ))
    }
}

/// One entry of the discovery endpoint's target list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub target_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Picks the debug target to attach to: the first one advertising a socket address.
pub fn select_target(targets: Vec<TargetDescriptor>, source: &str) -> Result<TargetDescriptor> {
    targets
        .into_iter()
        .find(|t| {
            t.web_socket_debugger_url
                .as_deref()
                .is_some_and(|url| !url.is_empty())
        })
        .ok_or_else(|| CdpError::NoTarget(source.to_string()))
}

/// Best-effort guess at the inspected runtime. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Deno,
    Node,
    Unknown,
}

impl RuntimeKind {
    pub fn detect(target: &TargetDescriptor) -> Self {
        let description = target.description.to_lowercase();
        let title = target.title.to_lowercase();
        if description.contains("deno") || title.contains("deno") {
            Self::Deno
        } else if description.contains("node") || title.contains("node") {
            Self::Node
        } else {
            Self::Unknown
        }
    }
}
