// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::UnitError;
use crate::protocol::is_stream_format;

/// Typed view of a `setup` request's `data` object.
///
/// ```json
/// {"model": "yolo11n", "response_format": "yolo.box.stream",
///  "input": ["yolo.jpeg.base64", "camera.1000"], "enoutput": true}
/// ```
///
/// Keys not listed here are kept in `options` and handed to the engine factory
/// and to every job as metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetupRequest {
    pub model: String,
    #[serde(default)]
    pub response_format: String,
    #[serde(default)]
    pub input: InputSpec,
    #[serde(default = "default_enoutput")]
    pub enoutput: bool,
    #[serde(default)]
    pub enstream: Option<bool>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// `input` may be given as a single string or a list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    One(String),
    Many(Vec<String>),
}

impl Default for InputSpec {
    fn default() -> Self {
        InputSpec::Many(Vec::new())
    }
}

impl InputSpec {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            InputSpec::One(topic) if topic.is_empty() => Vec::new(),
            InputSpec::One(topic) => vec![topic],
            InputSpec::Many(topics) => topics,
        }
    }
}

fn default_enoutput() -> bool {
    true
}

impl SetupRequest {
    pub fn from_value(data: &Value) -> Result<Self, UnitError> {
        let req: SetupRequest = serde_json::from_value(data.clone())?;
        if req.model.is_empty() {
            return Err(UnitError::ConfigParse("setup requires a model".to_string()));
        }
        Ok(req)
    }

    /// Explicit `enstream` wins; otherwise the response format decides.
    pub fn stream_enabled(&self) -> bool {
        self.enstream
            .unwrap_or_else(|| is_stream_format(&self.response_format))
    }

    pub fn inputs(&self) -> Vec<String> {
        self.input.clone().into_vec()
    }
}
