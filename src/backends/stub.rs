// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{ModelConfig, SetupRequest};
use crate::errors::EngineError;
use crate::protocol::Payload;
use crate::traits::{EngineFactory, EngineOutput, InferenceEngine, InferenceJob};

pub type Seen = Arc<Mutex<Vec<Vec<u8>>>>;

/// Echoes every payload back and records it, optionally sleeping first.
pub struct RecordingEngine {
    pub seen: Seen,
    pub delay: Duration,
}

#[async_trait]
impl InferenceEngine for RecordingEngine {
    async fn infer(&mut self, job: &InferenceJob) -> Result<Vec<EngineOutput>, EngineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().unwrap().push(job.payload.clone());
        Ok(vec![EngineOutput::whole(Payload::Bytes(job.payload.clone()))])
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Fails on the payload `fail` and echoes everything else.
pub struct FailingEngine {
    pub seen: Seen,
}

#[async_trait]
impl InferenceEngine for FailingEngine {
    async fn infer(&mut self, job: &InferenceJob) -> Result<Vec<EngineOutput>, EngineError> {
        self.seen.lock().unwrap().push(job.payload.clone());
        if job.payload == b"fail" {
            return Err(EngineError::Inference("simulated engine failure".to_string()));
        }
        Ok(vec![EngineOutput::whole(Payload::Bytes(job.payload.clone()))])
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Builds stub engines keyed by `ModelConfig::engine`: `recording`, `failing`,
/// and `broken` (always fails to load). All engines share one `seen` list.
#[derive(Default)]
pub struct StubFactory {
    seen: Seen,
    delay: Duration,
}

impl StubFactory {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn seen(&self) -> Seen {
        self.seen.clone()
    }
}

impl EngineFactory for StubFactory {
    fn create(
        &self,
        model: &ModelConfig,
        _setup: &SetupRequest,
    ) -> Result<Box<dyn InferenceEngine>, EngineError> {
        match model.engine.as_str() {
            "recording" => Ok(Box::new(RecordingEngine {
                seen: self.seen.clone(),
                delay: self.delay,
            })),
            "failing" => Ok(Box::new(FailingEngine {
                seen: self.seen.clone(),
            })),
            other => Err(EngineError::Load(format!("stub engine '{}' unavailable", other))),
        }
    }
}
