// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ErrorBody, UnitError};
use crate::protocol::WorkId;

/// Inbound control envelope: `{request_id, work_id, action, object, data}`.
///
/// Only the control topic carries this shape. Output envelopes arriving on a
/// linked topic are read by the receiving task, which looks at `object`,
/// `data`, `request_id` and the `error` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub request_id: String,
    pub work_id: WorkId,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub data: Value,
}

impl RequestEnvelope {
    pub fn new(
        request_id: impl Into<String>,
        work_id: impl Into<WorkId>,
        action: impl Into<String>,
        object: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            work_id: work_id.into(),
            action: action.into(),
            object: object.into(),
            data,
        }
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, UnitError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Outbound envelope: `{request_id, work_id, created, object, data, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub work_id: WorkId,
    pub created: u64,
    pub object: String,
    pub data: Value,
    pub error: ErrorBody,
}

impl ResponseEnvelope {
    pub fn success(
        request_id: impl Into<String>,
        work_id: WorkId,
        object: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            work_id,
            created: unix_now(),
            object: object.into(),
            data,
            error: ErrorBody::ok(),
        }
    }

    pub fn failure(request_id: impl Into<String>, work_id: WorkId, err: &UnitError) -> Self {
        Self {
            request_id: request_id.into(),
            work_id,
            created: unix_now(),
            object: "None".to_string(),
            data: Value::String("None".to_string()),
            error: ErrorBody::from(err),
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = object.into();
        self
    }

    /// Acknowledgement for lifecycle actions that return no data.
    pub fn ack(request_id: impl Into<String>, work_id: WorkId) -> Self {
        Self::success(request_id, work_id, "None", Value::String("None".to_string()))
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_ok()
    }
}

/// One piece of a chunked payload: `{index, total?, delta, finish}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub delta: Value,
    #[serde(default)]
    pub finish: bool,
}

impl StreamChunk {
    pub fn from_value(data: &Value) -> Result<Self, UnitError> {
        Ok(serde_json::from_value(data.clone())?)
    }

    /// Chunk body as raw bytes. String deltas are taken verbatim; any other
    /// JSON value is carried as its serialized text.
    pub fn delta_bytes(&self) -> Vec<u8> {
        value_bytes(&self.delta)
    }
}

/// Engine output before channel framing.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Json(Value::String(text.into()))
    }
}

/// Raw bytes of a data-plane JSON value.
pub(crate) fn value_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Null => Vec::new(),
        other => other.to_string().into_bytes(),
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
