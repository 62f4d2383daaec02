// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for inference queue overload and worker lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// New input dropped because the task's queue was full.
///
/// # Log Level
/// `warn!` - Overload; the remote sender is not told
///
/// # Example
/// ```
/// use unitflow::observability::messages::queue::JobDropped;
///
/// let msg = JobDropped {
///     work_id: "yolo.1000",
///     capacity: 3,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct JobDropped<'a> {
    pub work_id: &'a str,
    pub capacity: usize,
}

impl Display for JobDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' inference queue full (capacity={}), dropping new job",
            self.work_id, self.capacity
        )
    }
}

impl StructuredLog for JobDropped<'_> {
    fn log(&self) {
        tracing::warn!(
            work_id = self.work_id,
            capacity = self.capacity,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "job_dropped",
            span_name = name,
            work_id = self.work_id,
            capacity = self.capacity,
        )
    }
}

/// Worker started draining a task's queue.
///
/// # Log Level
/// `debug!`
pub struct WorkerStarted<'a> {
    pub work_id: &'a str,
}

impl Display for WorkerStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Worker for task '{}' started", self.work_id)
    }
}

impl StructuredLog for WorkerStarted<'_> {
    fn log(&self) {
        tracing::debug!(work_id = self.work_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("worker", span_name = name, work_id = self.work_id)
    }
}

/// Worker observed the shutdown sentinel and exited.
///
/// # Log Level
/// `debug!`
pub struct WorkerStopped<'a> {
    pub work_id: &'a str,
    pub processed: u64,
}

impl Display for WorkerStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Worker for task '{}' stopped after {} jobs",
            self.work_id, self.processed
        )
    }
}

impl StructuredLog for WorkerStopped<'_> {
    fn log(&self) {
        tracing::debug!(
            work_id = self.work_id,
            processed = self.processed,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "worker_stopped",
            span_name = name,
            work_id = self.work_id,
            processed = self.processed,
        )
    }
}

/// Joining the worker failed (the worker panicked or was aborted).
///
/// # Log Level
/// `error!` - The engine handle may not have been released cleanly
pub struct WorkerJoinFailed<'a> {
    pub work_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for WorkerJoinFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Worker for task '{}' did not exit cleanly: {}", self.work_id, self.error)
    }
}

impl StructuredLog for WorkerJoinFailed<'_> {
    fn log(&self) {
        tracing::error!(work_id = self.work_id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "worker_join_failed",
            span_name = name,
            work_id = self.work_id,
            error = %self.error,
        )
    }
}
