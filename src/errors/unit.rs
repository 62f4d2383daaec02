// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error taxonomy reported to remote callers inside the `error` object of a
//! response envelope.
//!
//! Every variant maps to a fixed negative wire code. Code `0` is reserved for
//! success and is produced by [`ErrorBody::ok`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::EngineError;

/// Errors surfaced by the unit controller and its tasks.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UnitError {
    /// Envelope or setup data could not be parsed.
    #[error("json format error: {0}")]
    ConfigParse(String),

    /// The envelope named an action this unit does not implement.
    #[error("action match false: {0}")]
    InvalidAction(String),

    /// A lifecycle operation arrived in a state that does not allow it.
    #[error("task not ready: {0}")]
    TaskNotReady(String),

    /// The engine handle could not be created or initialised.
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    /// No live task answers to the given work id.
    #[error("unit does not exist: {0}")]
    UnitNotExist(String),

    /// The engine failed while running a job.
    #[error("inference failure: {0}")]
    Inference(String),

    /// An upstream topic could not be resolved or is already linked.
    #[error("link false: {0}")]
    LinkFailed(String),

    /// Task limit reached, or the work id is already live.
    #[error("task full: {0}")]
    TaskFull(String),

    #[error("base64 decoding error: {0}")]
    Base64Decode(String),

    #[error("the inference data is empty")]
    EmptyInput,

    /// A chunk arrived out of sequence; the sender's buffer was discarded.
    #[error("stream data index error: expected {expected}, got {got}")]
    StreamIndex { expected: u64, got: u64 },
}

impl UnitError {
    /// Wire code carried in `error.code`.
    pub fn code(&self) -> i32 {
        match self {
            UnitError::ConfigParse(_) => -2,
            UnitError::InvalidAction(_) => -3,
            UnitError::TaskNotReady(_) => -4,
            UnitError::ModelLoad(_) => -5,
            UnitError::UnitNotExist(_) => -6,
            UnitError::Inference(_) => -11,
            UnitError::LinkFailed(_) => -20,
            UnitError::TaskFull(_) => -21,
            UnitError::Base64Decode(_) => -23,
            UnitError::EmptyInput => -24,
            UnitError::StreamIndex { .. } => -25,
        }
    }
}

impl From<EngineError> for UnitError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Load(reason) => UnitError::ModelLoad(reason),
            EngineError::Inference(reason) => UnitError::Inference(reason),
        }
    }
}

impl From<serde_json::Error> for UnitError {
    fn from(err: serde_json::Error) -> Self {
        UnitError::ConfigParse(err.to_string())
    }
}

/// The `error` object of a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

impl ErrorBody {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

impl Default for ErrorBody {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<&UnitError> for ErrorBody {
    fn from(err: &UnitError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
