// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod audio;          // slice stitching for streaming decoders
pub mod backends;       // inference engines
pub mod bus;            // in-process bus + registry
pub mod config;         // unit config + setup requests
pub mod errors;         // error handling
pub mod observability;
pub mod protocol;       // work ids, envelopes, stream chunks
pub mod runtime;        // channels, queues, tasks, controller
pub mod traits;         // bus / engine seams
