// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::protocol::Payload;
use crate::traits::{EngineOutput, InferenceEngine, InferenceJob};

/// Echo engine - returns every input payload unchanged
pub struct EchoEngine;

impl EchoEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for EchoEngine {
    async fn infer(&mut self, job: &InferenceJob) -> Result<Vec<EngineOutput>, EngineError> {
        Ok(vec![EngineOutput::whole(Payload::Bytes(job.payload.clone()))])
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_payload() {
        let mut engine = EchoEngine::new();
        let outputs = engine
            .infer(&InferenceJob::new("kws.text", b"hello".to_vec()))
            .await
            .unwrap();

        assert_eq!(outputs, vec![EngineOutput::whole(Payload::Bytes(b"hello".to_vec()))]);
    }
}
