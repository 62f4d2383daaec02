// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Inference engine backends.
//!
//! Engines are created per task by an [`EngineFactory`](crate::traits::EngineFactory)
//! from the model entry named in `setup`:
//! ```text
//! UnitConfig.models[model] → Factory → Box<dyn InferenceEngine> → task worker
//! ```
//!
//! ## Local Backend
//! In-process engines with no external runtime:
//! - **echo**: returns the input payload, useful for wiring pipelines
//! - **pcm_stitch**: overlap-add stitching of decoder output slices
//!
//! ## Stub Backend (Test-Only)
//! Recording and failing engines for lifecycle tests. NOT available in
//! production builds.
//!
//! # Examples
//!
//! ```rust
//! use unitflow::backends::local::LocalEngineFactory;
//! use unitflow::config::{ModelConfig, SetupRequest};
//! use unitflow::traits::EngineFactory;
//!
//! let setup = SetupRequest::from_value(&serde_json::json!({"model": "echo"})).unwrap();
//! let engine = LocalEngineFactory.create(&ModelConfig::new("echo"), &setup).unwrap();
//! assert_eq!(engine.name(), "echo");
//! ```

pub mod local;
#[cfg(test)]
pub mod stub;
