// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Audio helpers used by the streaming decoder engines.

pub mod stitch;

pub use stitch::{stitch, SliceStitcher};
