// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Wire types shared by the control plane and the data plane.
//!
//! * [`WorkId`] - task address, `<unit>.<instance>`
//! * [`RequestEnvelope`] / [`ResponseEnvelope`] - JSON control envelopes
//! * [`StreamChunk`] - one indexed piece of a chunked payload
//! * [`Payload`] - engine output before it is framed onto the bus

pub(crate) mod codec;
mod envelope;
mod work_id;

pub use codec::{decode_chunk, decode_payload, framed_object, is_base64_format, is_stream_format};
pub use envelope::{Payload, RequestEnvelope, ResponseEnvelope, StreamChunk};
pub(crate) use envelope::value_bytes;
pub use work_id::WorkId;
