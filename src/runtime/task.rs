// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One configured model instance addressed by a work id.
//!
//! A [`Task`] owns its engine (moved into the worker), its [`Channel`], its
//! bounded queue and the list of inputs it listens on. Inputs come in two
//! kinds:
//!
//! * a format tag of the task's own unit (`yolo.jpeg.base64`), meaning raw data
//!   addressed to this task's work id
//! * another task's work id (`camera.1000`), resolved through the registry to
//!   that task's output topic
//!
//! Bus handlers never touch the engine. They decode, reassemble and enqueue;
//! everything else happens on the worker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::config::{SetupRequest, UnitConfig};
use crate::errors::{ErrorBody, UnitError};
use crate::observability::messages::queue::JobDropped;
use crate::observability::messages::task::{
    InferenceCompleted, InferenceFailed, InputRejected, StaleDelivery,
};
use crate::observability::messages::StructuredLog;
use crate::protocol::{
    decode_chunk, decode_payload, is_stream_format, value_bytes, StreamChunk, WorkId,
};
use crate::runtime::accelerator::{AcceleratorContext, AcceleratorLease};
use crate::runtime::channel::Channel;
use crate::runtime::queue::{InferenceWorker, JobHandler, PutOutcome};
use crate::runtime::reassembler::StreamReassembler;
use crate::traits::{
    BusClient, BusMessage, EngineFactory, InferenceEngine, InferenceJob, MessageHandler, Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Configured,
    Running,
    Paused,
    Destroyed,
}

/// Result of [`Task::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A stream chunk was buffered; the message is not complete yet.
    Pending,
    Queued,
    /// The queue was full and the job was discarded.
    Dropped,
}

/// Body of a `taskinfo` reply for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub model: String,
    pub response_format: String,
    pub enoutput: bool,
    pub inputs: Vec<String>,
}

/// Shared collaborators a task is built from.
#[derive(Clone)]
pub struct TaskDeps {
    pub bus: Arc<dyn BusClient>,
    pub registry: Arc<dyn Registry>,
    pub factory: Arc<dyn EngineFactory>,
    pub accelerator: AcceleratorContext,
}

/// Data-plane message as seen on an input topic. Upstream output envelopes
/// carry an `error` body; failed ones are not forwarded as input.
#[derive(Debug, Deserialize)]
struct InboundData {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    object: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<ErrorBody>,
}

pub struct Task {
    work_id: WorkId,
    setup: SetupRequest,
    capacity: usize,
    channel: Arc<Channel>,
    registry: Arc<dyn Registry>,
    worker: Mutex<Option<InferenceWorker<InferenceJob>>>,
    inputs: Mutex<Vec<String>>,
    state: Mutex<TaskState>,
    reassembler: Mutex<StreamReassembler>,
    lease: Mutex<Option<AcceleratorLease>>,
}

impl Task {
    /// Build the engine, channel and worker for `setup` and register the
    /// task's output topic. Inputs are not subscribed until [`connect`](Self::connect).
    ///
    /// Must be called from within a tokio runtime.
    pub fn load(
        work_id: WorkId,
        config: &UnitConfig,
        setup: SetupRequest,
        deps: &TaskDeps,
    ) -> Result<Self, UnitError> {
        let model = config
            .models
            .get(&setup.model)
            .ok_or_else(|| UnitError::ModelLoad(format!("unknown model '{}'", setup.model)))?;

        let lease = if model.accelerator {
            Some(deps.accelerator.acquire()?)
        } else {
            None
        };
        let engine = deps.factory.create(model, &setup)?;

        let channel = Arc::new(Channel::new(
            work_id.clone(),
            deps.bus.clone(),
            deps.registry.clone(),
            config.reply_topic.clone(),
        ));
        channel.set_output(setup.enoutput);
        channel.set_stream(setup.stream_enabled());

        let worker = InferenceWorker::start(
            work_id.as_str(),
            config.queue_capacity,
            TaskWorker {
                work_id: work_id.to_string(),
                engine,
                channel: channel.clone(),
                response_format: setup.response_format.clone(),
            },
        );

        let out_port = work_id.out_port();
        deps.registry.insert(&out_port, &out_port);

        Ok(Self {
            inputs: Mutex::new(setup.inputs()),
            work_id,
            setup,
            capacity: config.queue_capacity,
            channel,
            registry: deps.registry.clone(),
            worker: Mutex::new(Some(worker)),
            state: Mutex::new(TaskState::Created),
            reassembler: Mutex::new(StreamReassembler::new()),
            lease: Mutex::new(lease),
        })
    }

    pub fn work_id(&self) -> &WorkId {
        &self.work_id
    }

    pub fn model(&self) -> &str {
        &self.setup.model
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn set_request_id(&self, request_id: &str) {
        if !request_id.is_empty() {
            self.channel.set_request_id(request_id);
        }
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            model: self.setup.model.clone(),
            response_format: self.setup.response_format.clone(),
            enoutput: self.channel.output_enabled(),
            inputs: self.inputs(),
        }
    }

    /// Subscribe every declared input. On error the caller discards the task.
    pub fn connect(&self, handler: &MessageHandler) -> Result<(), UnitError> {
        if self.state() != TaskState::Created {
            return Err(UnitError::TaskNotReady(self.work_id.to_string()));
        }
        for input in self.inputs() {
            self.subscribe_input(&input, handler)?;
        }
        self.set_state(TaskState::Configured);
        Ok(())
    }

    /// `yolo.jpeg.base64` on unit `yolo` is raw input; `camera.1000` is not.
    fn is_raw_input(&self, topic: &str) -> bool {
        let id = WorkId::from(topic);
        id.unit() == self.work_id.unit() && id.instance().is_none()
    }

    fn subscribe_input(&self, topic: &str, handler: &MessageHandler) -> Result<(), UnitError> {
        if self.is_raw_input(topic) {
            if self.channel.is_subscribed(self.work_id.as_str()) {
                return Ok(());
            }
            self.channel.subscribe_work_id("", handler.clone())
        } else {
            self.channel.subscribe_work_id(topic, handler.clone())
        }
    }

    /// Add one upstream input at runtime. A paused task records it and
    /// subscribes on the next `work`.
    pub fn link(&self, topic: &str, handler: &MessageHandler) -> Result<(), UnitError> {
        let state = self.state();
        if matches!(state, TaskState::Created | TaskState::Destroyed) {
            return Err(UnitError::TaskNotReady(self.work_id.to_string()));
        }

        let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        if inputs.iter().any(|input| input == topic) {
            return Err(UnitError::LinkFailed(format!("'{}' is already linked", topic)));
        }

        if state == TaskState::Paused {
            if !self.is_raw_input(topic) {
                let port = WorkId::from(topic).out_port();
                if self.registry.lookup(&port).is_none() {
                    return Err(UnitError::LinkFailed(format!("'{}' is not registered", topic)));
                }
            }
        } else {
            self.subscribe_input(topic, handler)?;
        }

        inputs.push(topic.to_string());
        Ok(())
    }

    /// Remove one input. Unlinking a topic that is not linked is a no-op.
    pub fn unlink(&self, topic: &str) {
        let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        inputs.retain(|input| input != topic);

        if self.is_raw_input(topic) {
            // The own-topic subscription is shared by every raw input.
            if !inputs.iter().any(|input| self.is_raw_input(input)) {
                self.channel.stop_subscriber_work_id("");
            }
        } else {
            self.channel.stop_subscriber_work_id(topic);
        }
    }

    /// Resume input handling. Idempotent while running.
    pub fn work(&self, handler: &MessageHandler) -> Result<(), UnitError> {
        match self.state() {
            TaskState::Created | TaskState::Destroyed => {
                Err(UnitError::TaskNotReady(self.work_id.to_string()))
            }
            TaskState::Running => Ok(()),
            TaskState::Configured => {
                self.set_state(TaskState::Running);
                Ok(())
            }
            TaskState::Paused => {
                for input in self.inputs() {
                    if let Err(err) = self.subscribe_input(&input, handler) {
                        self.channel.close();
                        return Err(err);
                    }
                }
                self.set_state(TaskState::Running);
                Ok(())
            }
        }
    }

    /// Stop listening on every input while keeping the input list.
    pub fn pause(&self) -> Result<(), UnitError> {
        match self.state() {
            TaskState::Created | TaskState::Destroyed => {
                Err(UnitError::TaskNotReady(self.work_id.to_string()))
            }
            TaskState::Paused => Ok(()),
            TaskState::Configured | TaskState::Running => {
                self.channel.close();
                self.set_state(TaskState::Paused);
                Ok(())
            }
        }
    }

    /// Bus handler entry point for every input topic.
    pub fn on_message(&self, msg: BusMessage) {
        if self.state() == TaskState::Destroyed {
            StaleDelivery {
                work_id: self.work_id.as_str(),
                topic: &msg.topic,
            }
            .log();
            return;
        }

        let inbound: InboundData = match serde_json::from_slice(&msg.payload) {
            Ok(inbound) => inbound,
            Err(err) => {
                self.reject(&msg.topic, "None", &UnitError::from(err));
                return;
            }
        };

        if inbound.error.as_ref().is_some_and(|error| !error.is_ok()) {
            return;
        }

        self.set_request_id(&inbound.request_id);
        if let Err(err) = self.submit(&msg.topic, &inbound.object, &inbound.data) {
            self.reject(&msg.topic, &inbound.object, &err);
        }
    }

    fn reject(&self, topic: &str, object: &str, err: &UnitError) {
        InputRejected {
            work_id: self.work_id.as_str(),
            topic,
            error: err,
        }
        .log();
        // Delivery failures are already logged by the channel.
        let _ = self.channel.send_error(object, err);
    }

    /// Decode one input message and enqueue it for inference.
    ///
    /// `sender` keys stream reassembly; chunks from different senders never mix.
    pub fn submit(&self, sender: &str, object: &str, data: &Value) -> Result<SubmitOutcome, UnitError> {
        if matches!(
            self.state(),
            TaskState::Created | TaskState::Paused | TaskState::Destroyed
        ) {
            return Err(UnitError::TaskNotReady(self.work_id.to_string()));
        }

        let payload = if is_stream_format(object) {
            let chunk = StreamChunk::from_value(data)?;
            let mut reassembler = self.reassembler.lock().unwrap_or_else(PoisonError::into_inner);
            let delta = match decode_chunk(object, chunk.delta_bytes()) {
                Ok(delta) => delta,
                Err(err) => {
                    reassembler.discard(sender);
                    return Err(err);
                }
            };
            match reassembler.accept_bytes(sender, chunk.index, &delta, chunk.finish)? {
                Some(body) if body.is_empty() => return Err(UnitError::EmptyInput),
                Some(body) => body,
                None => return Ok(SubmitOutcome::Pending),
            }
        } else {
            decode_payload(object, value_bytes(data))?
        };

        let job = InferenceJob::new(object, payload).with_metadata(self.setup.options.clone());

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(worker) = worker.as_ref() else {
            return Err(UnitError::TaskNotReady(self.work_id.to_string()));
        };
        match worker.put(job) {
            PutOutcome::Queued => Ok(SubmitOutcome::Queued),
            PutOutcome::Dropped => {
                JobDropped {
                    work_id: self.work_id.as_str(),
                    capacity: self.capacity,
                }
                .log();
                Ok(SubmitOutcome::Dropped)
            }
        }
    }

    /// Tear the task down: unsubscribe, drain and join the worker, release the
    /// engine and accelerator lease, unregister the output topic.
    ///
    /// Safe to call in any state and more than once.
    pub async fn destroy(&self) {
        self.set_state(TaskState::Destroyed);
        self.channel.close();

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker.stop().await;
        }

        self.lease.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.registry.remove(&self.work_id.out_port());
        self.reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Runs on the task's worker and owns the engine.
struct TaskWorker {
    work_id: String,
    engine: Box<dyn InferenceEngine>,
    channel: Arc<Channel>,
    response_format: String,
}

#[async_trait]
impl JobHandler<InferenceJob> for TaskWorker {
    async fn handle(&mut self, job: InferenceJob) {
        let object = if self.response_format.is_empty() {
            job.object.clone()
        } else {
            self.response_format.clone()
        };
        let started = Instant::now();

        match self.engine.infer(&job).await {
            Ok(outputs) => {
                let count = outputs.len();
                for output in outputs {
                    let _ = self.channel.send(&object, output.payload, output.finish);
                }
                InferenceCompleted {
                    work_id: &self.work_id,
                    engine: self.engine.name(),
                    input_size: job.payload.len(),
                    outputs: count,
                    duration: started.elapsed(),
                }
                .log();
            }
            Err(err) => {
                InferenceFailed {
                    work_id: &self.work_id,
                    engine: self.engine.name(),
                    error: &err,
                }
                .log();
                let _ = self.channel.send_error(&object, &UnitError::from(err));
            }
        }
    }
}
