// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod bus;
mod config;
mod engine;
mod unit;

pub use bus::BusError;
pub use config::ConfigError;
pub use engine::EngineError;
pub use unit::{ErrorBody, UnitError};
