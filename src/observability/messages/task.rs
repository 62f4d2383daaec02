// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for per-task input handling and inference events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Inference on one job completed.
///
/// # Log Level
/// `debug!` - Emitted for every job
///
/// # Example
/// ```
/// use unitflow::observability::messages::task::InferenceCompleted;
/// use std::time::Duration;
///
/// let msg = InferenceCompleted {
///     work_id: "yolo.1000",
///     engine: "echo",
///     input_size: 1024,
///     outputs: 1,
///     duration: Duration::from_millis(12),
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct InferenceCompleted<'a> {
    pub work_id: &'a str,
    pub engine: &'a str,
    pub input_size: usize,
    pub outputs: usize,
    pub duration: Duration,
}

impl Display for InferenceCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' engine '{}' completed: input={} bytes, outputs={}, duration={:?}",
            self.work_id, self.engine, self.input_size, self.outputs, self.duration
        )
    }
}

impl StructuredLog for InferenceCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            work_id = self.work_id,
            engine = self.engine,
            input_size = self.input_size,
            outputs = self.outputs,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "inference",
            span_name = name,
            work_id = self.work_id,
            engine = self.engine,
            input_size = self.input_size,
        )
    }
}

/// Inference on one job failed. The worker continues with the next job.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct InferenceFailed<'a> {
    pub work_id: &'a str,
    pub engine: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for InferenceFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' engine '{}' failed: {}",
            self.work_id, self.engine, self.error
        )
    }
}

impl StructuredLog for InferenceFailed<'_> {
    fn log(&self) {
        tracing::error!(
            work_id = self.work_id,
            engine = self.engine,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "inference_failed",
            span_name = name,
            work_id = self.work_id,
            engine = self.engine,
            error = %self.error,
        )
    }
}

/// Input on a subscribed topic could not be turned into a job.
///
/// # Log Level
/// `warn!` - The sender gets an error envelope on the task's channel
pub struct InputRejected<'a> {
    pub work_id: &'a str,
    pub topic: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for InputRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' rejected input from '{}': {}",
            self.work_id, self.topic, self.error
        )
    }
}

impl StructuredLog for InputRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            work_id = self.work_id,
            topic = self.topic,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "input_rejected",
            span_name = name,
            work_id = self.work_id,
            topic = self.topic,
        )
    }
}

/// A subscription fired for a task that is no longer registered.
///
/// # Log Level
/// `debug!` - Expected briefly around `exit`
pub struct StaleDelivery<'a> {
    pub work_id: &'a str,
    pub topic: &'a str,
}

impl Display for StaleDelivery<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Ignoring message on '{}' for torn-down task '{}'",
            self.topic, self.work_id
        )
    }
}

impl StructuredLog for StaleDelivery<'_> {
    fn log(&self) {
        tracing::debug!(work_id = self.work_id, topic = self.topic, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stale_delivery",
            span_name = name,
            work_id = self.work_id,
            topic = self.topic,
        )
    }
}
