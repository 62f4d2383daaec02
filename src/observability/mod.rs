// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging in the unit host. Message types follow a struct-based pattern with a
//! `Display` implementation so that:
//!
//! * Log text is defined once, next to its structured fields
//! * Call sites stay short (`TaskSetUp { .. }.log()`)
//! * Output is consistent across tasks and units
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::controller` - control-plane dispatch and task lifecycle
//! * `messages::task` - input decoding, inference and task teardown
//! * `messages::queue` - inference queue overload and worker lifecycle
//! * `messages::channel` - output delivery and subscription wiring
//!
//! # Usage
//!
//! ```rust
//! use unitflow::observability::messages::queue::JobDropped;
//! use unitflow::observability::messages::StructuredLog;
//!
//! JobDropped {
//!     work_id: "yolo.1000",
//!     capacity: 3,
//! }
//! .log();
//! ```

pub mod messages;
