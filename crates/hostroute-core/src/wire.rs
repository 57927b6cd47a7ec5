//! Worker message contract.
//!
//! Requests go out as `{"message": {...}}` to `{candidate_url}/messages`.
//! Replies are either a bare task (or message) object, a JSON-RPC style
//! success/error envelope wrapping one, an arbitrary JSON value, or plain text.
//! [`RawResponse`] is the closed set of shapes the rest of the pipeline sees.

use crate::error::DispatchError;
use crate::types::DispatchEnvelope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Deployed workers use either `type` or `kind` as the discriminator.
    #[serde(
        rename = "type",
        alias = "kind",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub part_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            part_type: Some("text".to_string()),
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(
        rename = "messageId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,
    #[serde(
        rename = "contextId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub context_id: Option<String>,
}

impl Message {
    pub fn is_agent(&self) -> bool {
        self.role.eq_ignore_ascii_case("agent")
    }

    pub fn first_text(&self) -> Option<&str> {
        first_text(&self.parts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(
        rename = "artifactId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Artifact {
    pub fn first_text(&self) -> Option<&str> {
        first_text(&self.parts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "contextId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Message>>,
}

fn first_text(parts: &[Part]) -> Option<&str> {
    parts.iter().find_map(|p| p.text.as_deref())
}

/// Body of `POST {candidate_url}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageParams {
    pub message: Message,
}

impl From<&DispatchEnvelope> for SendMessageParams {
    fn from(envelope: &DispatchEnvelope) -> Self {
        Self {
            message: Message {
                role: "user".to_string(),
                parts: vec![Part::text(envelope.task_text.clone())],
                message_id: Some(envelope.message_id.clone()),
                context_id: Some(envelope.context_id.clone()),
            },
        }
    }
}

/// Every reply shape a worker can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Text(String),
    Task(Task),
    Message(Message),
    Structured(Value),
    Empty,
}

enum Shape {
    Envelope,
    Task,
    Message,
    Other,
}

fn shape_of(map: &Map<String, Value>) -> Shape {
    let kind = map.get("kind").and_then(Value::as_str);
    if map.contains_key("jsonrpc")
        || (map.contains_key("id") && (map.contains_key("result") || map.contains_key("error")))
    {
        Shape::Envelope
    } else if kind == Some("task") || map.contains_key("artifacts") || map.contains_key("history")
    {
        Shape::Task
    } else if kind == Some("message") || (map.contains_key("role") && map.contains_key("parts")) {
        Shape::Message
    } else {
        Shape::Other
    }
}

impl RawResponse {
    /// Classify a response body. Bodies that are not JSON pass through as text
    /// unless the worker declared them JSON.
    pub fn from_body(body: &str, content_type: Option<&str>) -> Result<Self, DispatchError> {
        if body.trim().is_empty() {
            return Ok(RawResponse::Empty);
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(value),
            Err(e) if content_type.is_some_and(|ct| ct.contains("json")) => Err(
                DispatchError::MalformedResponse(format!("invalid JSON body: {}", e)),
            ),
            Err(_) => Ok(RawResponse::Text(body.to_string())),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, DispatchError> {
        let shape = match &value {
            Value::Null => return Ok(RawResponse::Empty),
            Value::String(s) => return Ok(RawResponse::Text(s.clone())),
            Value::Object(map) => shape_of(map),
            _ => Shape::Other,
        };

        match shape {
            Shape::Envelope => Self::unwrap_envelope(value),
            Shape::Task => serde_json::from_value(value)
                .map(RawResponse::Task)
                .map_err(|e| DispatchError::MalformedResponse(format!("invalid task: {}", e))),
            Shape::Message => serde_json::from_value(value)
                .map(RawResponse::Message)
                .map_err(|e| DispatchError::MalformedResponse(format!("invalid message: {}", e))),
            Shape::Other => Ok(RawResponse::Structured(value)),
        }
    }

    fn unwrap_envelope(value: Value) -> Result<Self, DispatchError> {
        let Value::Object(mut map) = value else {
            return Err(DispatchError::MalformedResponse(
                "envelope is not an object".to_string(),
            ));
        };

        if let Some(error) = map.remove("error").filter(|e| !e.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(DispatchError::Remote { code, message });
        }

        match map.remove("result") {
            Some(result) => Self::from_value(result),
            None => Err(DispatchError::MalformedResponse(
                "envelope carries neither result nor error".to_string(),
            )),
        }
    }
}
