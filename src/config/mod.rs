// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod setup;

pub mod consts;

pub use loader::{load_and_validate_config, load_config, validate_config, ModelConfig, UnitConfig};
pub use setup::{InputSpec, SetupRequest};
