// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Transport-level delivery failures.
///
/// These are returned to the caller of a publish, logged, and never allowed to
/// unwind through task control flow.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BusError {
    #[error("bus is closed")]
    Closed,

    #[error("failed to serialize envelope: {0}")]
    Serialize(String),

    #[error("no route for topic '{0}'")]
    NoRoute(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialize(err.to_string())
    }
}
