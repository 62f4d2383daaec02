// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit it at its fixed level with structured fields.

use tracing::Span;

pub mod channel;
pub mod controller;
pub mod queue;
pub mod task;

/// Emit a message at its designated level, or open a span carrying its fields.
pub trait StructuredLog {
    fn log(&self);

    fn span(&self, name: &str) -> Span;
}
