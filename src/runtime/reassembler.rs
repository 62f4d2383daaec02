// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-sender reassembly of chunked payloads.
//!
//! Chunks for one logical message arrive with consecutive indexes starting at 0
//! and the last one carries `finish = true`. Buffers are keyed by sender (the
//! topic the chunk arrived on), so interleaved streams from different upstream
//! units never mix.
//!
//! Any chunk other than the next expected index is a protocol violation: the
//! sender's buffer is discarded and the next stream must start again at 0.
//! Index 0 always (re)starts a stream.

use std::collections::HashMap;

use crate::errors::UnitError;
use crate::protocol::StreamChunk;

#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffers: HashMap<String, SenderBuffer>,
}

#[derive(Debug, Default)]
struct SenderBuffer {
    next_index: u64,
    data: Vec<u8>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk from `sender`.
    ///
    /// Returns `Ok(Some(message))` when the chunk completes a message, `Ok(None)`
    /// while more chunks are expected, and [`UnitError::StreamIndex`] when the
    /// index is out of sequence.
    pub fn accept(&mut self, sender: &str, chunk: &StreamChunk) -> Result<Option<Vec<u8>>, UnitError> {
        self.accept_bytes(sender, chunk.index, &chunk.delta_bytes(), chunk.finish)
    }

    pub fn accept_bytes(
        &mut self,
        sender: &str,
        index: u64,
        payload: &[u8],
        is_final: bool,
    ) -> Result<Option<Vec<u8>>, UnitError> {
        if index == 0 {
            self.buffers.insert(sender.to_string(), SenderBuffer::default());
        }

        let expected = self.buffers.get(sender).map_or(0, |buf| buf.next_index);
        if index != expected {
            self.buffers.remove(sender);
            return Err(UnitError::StreamIndex {
                expected,
                got: index,
            });
        }

        let buffer = self.buffers.entry(sender.to_string()).or_default();
        buffer.data.extend_from_slice(payload);
        buffer.next_index += 1;

        if is_final {
            Ok(self.buffers.remove(sender).map(|buf| buf.data))
        } else {
            Ok(None)
        }
    }

    /// Whether `sender` has a partially received message.
    pub fn is_pending(&self, sender: &str) -> bool {
        self.buffers.contains_key(sender)
    }

    /// Drop whatever `sender` had buffered; its next stream must start at 0.
    pub fn discard(&mut self, sender: &str) {
        self.buffers.remove(sender);
    }

    pub fn pending_senders(&self) -> usize {
        self.buffers.len()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
