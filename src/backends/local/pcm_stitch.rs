// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::audio::SliceStitcher;
use crate::errors::EngineError;
use crate::protocol::Payload;
use crate::traits::{EngineOutput, InferenceEngine, InferenceJob};

const SAMPLE_BYTES: usize = 4;

/// Stitches decoder output slices (little-endian `f32` PCM) into one stream.
///
/// Each job is one utterance: `slice_len` samples per slice, laid out
/// back to back. Every stitched segment is emitted as a partial output and the
/// trailing samples close the stream. `total_len` in the job metadata caps the
/// utterance length.
pub struct PcmStitchEngine {
    slice_len: usize,
    pad: usize,
    blend: usize,
}

impl PcmStitchEngine {
    pub fn new(slice_len: usize, pad: usize, blend: usize) -> Self {
        Self {
            slice_len,
            pad,
            blend,
        }
    }

    /// Read `slice_len`, `pad` and `blend` from engine options. `slice_len` of
    /// 0 (the default) treats the whole payload as one slice.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, EngineError> {
        let slice_len = usize_option(options, "slice_len")?.unwrap_or(0);
        let pad = usize_option(options, "pad")?.unwrap_or(0);
        let blend = usize_option(options, "blend")?.unwrap_or(pad);

        if slice_len > 0 && slice_len < 2 * pad {
            return Err(EngineError::Load(format!(
                "slice_len {} is shorter than both pads ({})",
                slice_len,
                2 * pad
            )));
        }
        Ok(Self::new(slice_len, pad, blend))
    }
}

fn usize_option(options: &Map<String, Value>, key: &str) -> Result<Option<usize>, EngineError> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| EngineError::Load(format!("option '{}' must be a non-negative integer", key))),
    }
}

fn decode_samples(bytes: &[u8]) -> Result<Vec<f32>, EngineError> {
    if bytes.len() % SAMPLE_BYTES != 0 {
        return Err(EngineError::Inference(format!(
            "pcm payload of {} bytes is not a whole number of f32 samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn encode_samples(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[async_trait]
impl InferenceEngine for PcmStitchEngine {
    async fn infer(&mut self, job: &InferenceJob) -> Result<Vec<EngineOutput>, EngineError> {
        let samples = decode_samples(&job.payload)?;
        let total_len = job
            .metadata
            .get("total_len")
            .and_then(Value::as_u64)
            .map(|n| n as usize);

        let slice_len = if self.slice_len == 0 {
            samples.len().max(1)
        } else {
            self.slice_len
        };

        let mut stitcher = SliceStitcher::new(self.pad, self.blend, total_len);
        let mut outputs = Vec::new();
        for slice in samples.chunks(slice_len) {
            let segment = stitcher.push(slice);
            if !segment.is_empty() {
                outputs.push(EngineOutput::partial(Payload::Bytes(encode_samples(&segment))));
            }
        }
        let tail = stitcher.finish();
        outputs.push(EngineOutput::whole(Payload::Bytes(encode_samples(&tail))));
        Ok(outputs)
    }

    fn name(&self) -> &'static str {
        "pcm_stitch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(samples: &[f32]) -> InferenceJob {
        InferenceJob::new("tts.pcm", encode_samples(samples))
    }

    fn collect(outputs: &[EngineOutput]) -> Vec<f32> {
        outputs
            .iter()
            .flat_map(|out| match &out.payload {
                Payload::Bytes(bytes) => decode_samples(bytes).unwrap(),
                Payload::Json(_) => panic!("expected pcm bytes"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_streams_segments_and_finishes_once() {
        let mut engine = PcmStitchEngine::new(6, 2, 2);
        let outputs = engine.infer(&job(&[0.25; 18])).await.unwrap();

        assert_eq!(outputs.len(), 4);
        assert!(outputs[..3].iter().all(|out| !out.finish));
        assert!(outputs[3].finish);
        let pcm = collect(&outputs);
        assert_eq!(pcm.len(), 12);
        assert!(pcm.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[tokio::test]
    async fn test_total_len_from_metadata() {
        let mut engine = PcmStitchEngine::new(6, 2, 2);
        let mut metadata = Map::new();
        metadata.insert("total_len".to_string(), json!(9));
        let outputs = engine
            .infer(&job(&[1.0; 18]).with_metadata(metadata))
            .await
            .unwrap();

        assert_eq!(collect(&outputs).len(), 9);
        assert!(outputs.last().unwrap().finish);
    }

    #[tokio::test]
    async fn test_misaligned_payload_is_inference_error() {
        let mut engine = PcmStitchEngine::new(0, 0, 0);
        let err = engine
            .infer(&InferenceJob::new("tts.pcm", vec![0, 1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Inference(_)));
    }

    #[test]
    fn test_options_are_validated() {
        let mut options = Map::new();
        options.insert("slice_len".to_string(), json!(3));
        options.insert("pad".to_string(), json!(2));
        assert!(PcmStitchEngine::from_options(&options).is_err());

        options.insert("slice_len".to_string(), json!("big"));
        assert!(PcmStitchEngine::from_options(&options).is_err());
    }
}
