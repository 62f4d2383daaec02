// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{Map, Value};

use super::{EchoEngine, PcmStitchEngine};
use crate::config::{ModelConfig, SetupRequest};
use crate::errors::EngineError;
use crate::traits::{EngineFactory, InferenceEngine};

/// Factory for in-process engines
pub struct LocalEngineFactory;

/// Model options overlaid with the setup request's extra keys.
fn merged_options(model: &ModelConfig, setup: &SetupRequest) -> Map<String, Value> {
    let mut options = model.options.clone();
    for (key, value) in &setup.options {
        options.insert(key.clone(), value.clone());
    }
    options
}

impl EngineFactory for LocalEngineFactory {
    /// The `engine` key of the model selects the implementation:
    /// - "echo" -> EchoEngine
    /// - "pcm_stitch" -> PcmStitchEngine (`slice_len`, `pad`, `blend` options)
    fn create(
        &self,
        model: &ModelConfig,
        setup: &SetupRequest,
    ) -> Result<Box<dyn InferenceEngine>, EngineError> {
        match model.engine.as_str() {
            "echo" => Ok(Box::new(EchoEngine::new())),
            "pcm_stitch" => Ok(Box::new(PcmStitchEngine::from_options(&merged_options(
                model, setup,
            ))?)),
            other => Err(EngineError::Load(format!(
                "Unknown local engine implementation: '{}'",
                other
            ))),
        }
    }
}
