// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for control-plane dispatch and task lifecycle.
//!
//! This module contains message types for logging events related to:
//! * Request dispatch by action
//! * Task setup, failure and exit
//! * Shared accelerator context acquisition and release
//! * Controller shutdown

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Control request received.
///
/// # Log Level
/// `debug!`
pub struct RequestReceived<'a> {
    pub request_id: &'a str,
    pub work_id: &'a str,
    pub action: &'a str,
}

impl Display for RequestReceived<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Request '{}' action '{}' for '{}'",
            self.request_id, self.action, self.work_id
        )
    }
}

impl StructuredLog for RequestReceived<'_> {
    fn log(&self) {
        tracing::debug!(
            request_id = self.request_id,
            work_id = self.work_id,
            action = self.action,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "request",
            span_name = name,
            request_id = self.request_id,
            work_id = self.work_id,
            action = self.action,
        )
    }
}

/// Task set up and registered.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use unitflow::observability::messages::controller::TaskSetUp;
///
/// let msg = TaskSetUp {
///     work_id: "yolo.1000",
///     model: "yolo11n",
///     inputs: &["yolo.jpeg.base64".to_string()],
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct TaskSetUp<'a> {
    pub work_id: &'a str,
    pub model: &'a str,
    pub inputs: &'a [String],
}

impl Display for TaskSetUp<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' set up with model '{}', inputs=[{}]",
            self.work_id,
            self.model,
            self.inputs.join(", ")
        )
    }
}

impl StructuredLog for TaskSetUp<'_> {
    fn log(&self) {
        tracing::info!(
            work_id = self.work_id,
            model = self.model,
            inputs = self.inputs.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "task_setup",
            span_name = name,
            work_id = self.work_id,
            model = self.model,
        )
    }
}

/// Lifecycle request rejected.
///
/// # Log Level
/// `warn!` - Reported to the caller
pub struct RequestFailed<'a> {
    pub work_id: &'a str,
    pub action: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for RequestFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Action '{}' for '{}' failed: {}",
            self.action, self.work_id, self.error
        )
    }
}

impl StructuredLog for RequestFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            work_id = self.work_id,
            action = self.action,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "request_failed",
            span_name = name,
            work_id = self.work_id,
            action = self.action,
        )
    }
}

pub struct TaskExited<'a> {
    pub work_id: &'a str,
}

impl Display for TaskExited<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Task '{}' exited", self.work_id)
    }
}

impl StructuredLog for TaskExited<'_> {
    fn log(&self) {
        tracing::info!(work_id = self.work_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("task_exit", span_name = name, work_id = self.work_id)
    }
}

/// Shared accelerator context changed hands.
///
/// # Log Level
/// `info!` on init/deinit, `debug!` otherwise
pub struct AcceleratorHolders {
    pub holders: usize,
    pub acquired: bool,
}

impl Display for AcceleratorHolders {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let verb = if self.acquired { "acquired" } else { "released" };
        write!(f, "Accelerator context {}: {} holders", verb, self.holders)
    }
}

impl StructuredLog for AcceleratorHolders {
    fn log(&self) {
        let boundary = (self.acquired && self.holders == 1) || (!self.acquired && self.holders == 0);
        if boundary {
            tracing::info!(holders = self.holders, acquired = self.acquired, "{}", self);
        } else {
            tracing::debug!(holders = self.holders, acquired = self.acquired, "{}", self);
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("accelerator", span_name = name, holders = self.holders)
    }
}

pub struct ControllerStopped<'a> {
    pub unit: &'a str,
    pub tasks: usize,
}

impl Display for ControllerStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Unit '{}' stopped, {} tasks torn down", self.unit, self.tasks)
    }
}

impl StructuredLog for ControllerStopped<'_> {
    fn log(&self) {
        tracing::info!(unit = self.unit, tasks = self.tasks, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("controller_stopped", span_name = name, unit = self.unit)
    }
}
