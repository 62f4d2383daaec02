// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for channel output delivery and subscription wiring.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Publishing an envelope failed on the transport.
///
/// # Log Level
/// `warn!` - Returned to the caller, never raised further
pub struct DeliveryFailed<'a> {
    pub work_id: &'a str,
    pub topic: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for DeliveryFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Channel '{}' failed to deliver on '{}': {}",
            self.work_id, self.topic, self.error
        )
    }
}

impl StructuredLog for DeliveryFailed<'_> {
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
            "delivery_failed",
            span_name = name,
            work_id = self.work_id,
            topic = self.topic,
        )
    }
}

/// Channel subscribed to an input topic.
///
/// # Log Level
/// `info!`
pub struct Subscribed<'a> {
    pub work_id: &'a str,
    pub topic: &'a str,
    pub address: &'a str,
}

impl Display for Subscribed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Channel '{}' subscribed to '{}' at '{}'",
            self.work_id, self.topic, self.address
        )
    }
}

impl StructuredLog for Subscribed<'_> {
    fn log(&self) {
        tracing::info!(
            work_id = self.work_id,
            topic = self.topic,
            address = self.address,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "subscribed",
            span_name = name,
            work_id = self.work_id,
            topic = self.topic,
        )
    }
}

pub struct Unsubscribed<'a> {
    pub work_id: &'a str,
    pub topic: &'a str,
}

impl Display for Unsubscribed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Channel '{}' unsubscribed from '{}'", self.work_id, self.topic)
    }
}

impl StructuredLog for Unsubscribed<'_> {
    fn log(&self) {
        tracing::info!(work_id = self.work_id, topic = self.topic, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "unsubscribed",
            span_name = name,
            work_id = self.work_id,
            topic = self.topic,
        )
    }
}
