use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::{ModelConfig, SetupRequest};
use crate::errors::EngineError;
use crate::protocol::Payload;

/// One decoded unit of input, consumed exactly once by the task's worker.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceJob {
    /// The `object` the data arrived with, e.g. `image.jpeg.base64`.
    pub object: String,
    pub payload: Vec<u8>,
    /// Post-processing hints copied from the setup options (e.g. `bgr2rgb`).
    pub metadata: Map<String, Value>,
}

impl InferenceJob {
    pub fn new(object: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            object: object.into(),
            payload,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One result frame. `finish` closes a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub payload: Payload,
    pub finish: bool,
}

impl EngineOutput {
    pub fn whole(payload: Payload) -> Self {
        Self {
            payload,
            finish: true,
        }
    }

    pub fn partial(payload: Payload) -> Self {
        Self {
            payload,
            finish: false,
        }
    }
}

/// Model runtime handle owned by exactly one task and only touched by that
/// task's worker.
#[async_trait]
pub trait InferenceEngine: Send {
    async fn infer(&mut self, job: &InferenceJob) -> Result<Vec<EngineOutput>, EngineError>;

    fn name(&self) -> &'static str;
}

/// Builds engine handles from a model entry in the unit config.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        model: &ModelConfig,
        setup: &SetupRequest,
    ) -> Result<Box<dyn InferenceEngine>, EngineError>;
}
