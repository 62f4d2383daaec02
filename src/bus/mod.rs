// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process implementations of the bus and registry contracts.
//!
//! A deployed unit talks to a socket-based bus and a registry service; these
//! stand-ins let a whole pipeline of controllers run inside one process, which
//! is how the binary and the tests wire units together.

mod local;
mod registry;

pub use local::LocalBus;
pub use registry::StaticRegistry;
