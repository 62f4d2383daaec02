// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failures raised by an inference engine handle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The engine could not be constructed or its model could not be loaded.
    #[error("{0}")]
    Load(String),

    /// A single job failed. The worker reports it and moves on to the next job.
    #[error("{0}")]
    Inference(String),
}
