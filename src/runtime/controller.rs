// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-process unit controller.
//!
//! The controller owns the `work_id -> Task` table and answers lifecycle
//! requests arriving on the unit's control topic:
//!
//! | action      | effect                                             |
//! |-------------|----------------------------------------------------|
//! | `setup`     | allocate a work id, load the model, wire inputs    |
//! | `work`      | resume input handling                              |
//! | `pause`     | stop listening on inputs, keep the input list      |
//! | `link`      | add one upstream input (`data` is the topic)       |
//! | `unlink`    | remove one upstream input                          |
//! | `taskinfo`  | list tasks, or describe one                        |
//! | `exit`      | tear a task down                                   |
//! | `inference` | submit `{object, data}` to a task, no reply on success |
//!
//! Every reply is a [`ResponseEnvelope`]; failures carry a negative code and
//! never leave a half-built task behind.
//!
//! Bus handlers do not own their task. They carry a work id and resolve it
//! against the [`TaskTable`] on every delivery, so a task torn down by `exit`
//! is dropped even if a late message still reaches its handler.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::{SetupRequest, UnitConfig};
use crate::errors::{BusError, UnitError};
use crate::observability::messages::channel::DeliveryFailed;
use crate::observability::messages::controller::{
    ControllerStopped, RequestFailed, RequestReceived, TaskExited, TaskSetUp,
};
use crate::observability::messages::task::StaleDelivery;
use crate::observability::messages::StructuredLog;
use crate::protocol::{RequestEnvelope, ResponseEnvelope, WorkId};
use crate::runtime::accelerator::{AcceleratorContext, AcceleratorDriver};
use crate::runtime::task::{Task, TaskDeps};
use crate::traits::{BusClient, BusMessage, EngineFactory, MessageHandler, Registry, SubscriptionId};

/// Live tasks by work id.
#[derive(Clone, Default)]
pub struct TaskTable {
    inner: Arc<RwLock<HashMap<WorkId, Arc<Task>>>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, work_id: &WorkId) -> Option<Arc<Task>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(work_id)
            .cloned()
    }

    pub fn insert(&self, work_id: WorkId, task: Arc<Task>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(work_id, task);
    }

    pub fn remove(&self, work_id: &WorkId) -> Option<Arc<Task>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(work_id)
    }

    pub fn contains(&self, work_id: &WorkId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(work_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted ids of every live task.
    pub fn ids(&self) -> Vec<WorkId> {
        let mut ids: Vec<WorkId> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn drain(&self) -> Vec<Arc<Task>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, task)| task)
            .collect()
    }

    /// Bus handler that forwards to the task registered under `work_id`, or
    /// logs and drops the message when there is none.
    pub fn handler_for(&self, work_id: WorkId) -> MessageHandler {
        let table = self.clone();
        Arc::new(move |msg: BusMessage| match table.get(&work_id) {
            Some(task) => task.on_message(msg),
            None => StaleDelivery {
                work_id: work_id.as_str(),
                topic: &msg.topic,
            }
            .log(),
        })
    }
}

pub struct UnitController {
    config: UnitConfig,
    deps: TaskDeps,
    tasks: TaskTable,
    /// Serialises lifecycle changes and holds the next instance id to hand out.
    control: Mutex<u32>,
    shutdown: CancellationToken,
}

impl UnitController {
    pub fn new(
        config: UnitConfig,
        bus: Arc<dyn BusClient>,
        registry: Arc<dyn Registry>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let first_instance = config.first_instance_id;
        Self {
            config,
            deps: TaskDeps {
                bus,
                registry,
                factory,
                accelerator: AcceleratorContext::default(),
            },
            tasks: TaskTable::new(),
            control: Mutex::new(first_instance),
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `driver` for the shared accelerator instead of the no-op default.
    pub fn with_accelerator(mut self, driver: Arc<dyn AcceleratorDriver>) -> Self {
        self.deps.accelerator = AcceleratorContext::new(driver);
        self
    }

    pub fn config(&self) -> &UnitConfig {
        &self.config
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    pub fn accelerator(&self) -> &AcceleratorContext {
        &self.deps.accelerator
    }

    /// Parse and dispatch one raw control message.
    pub async fn handle_raw(&self, raw: &[u8]) -> Option<ResponseEnvelope> {
        match RequestEnvelope::from_slice(raw) {
            Ok(req) => self.handle_request(req).await,
            Err(err) => {
                let unit = WorkId::from(self.config.unit_name.as_str());
                RequestFailed {
                    work_id: unit.as_str(),
                    action: "None",
                    error: &err,
                }
                .log();
                Some(ResponseEnvelope::failure("", unit, &err))
            }
        }
    }

    /// Dispatch one control request. Returns the reply to publish, if any.
    pub async fn handle_request(&self, req: RequestEnvelope) -> Option<ResponseEnvelope> {
        RequestReceived {
            request_id: &req.request_id,
            work_id: req.work_id.as_str(),
            action: &req.action,
        }
        .log();

        let result = match req.action.as_str() {
            "setup" => self.setup(&req).await,
            "work" => self.work(&req).await,
            "pause" => self.pause(&req).await,
            "link" => self.link(&req).await,
            "unlink" => self.unlink(&req).await,
            "taskinfo" => self.taskinfo(&req),
            "exit" => self.exit(&req).await,
            "inference" => match self.inference(&req) {
                Ok(()) => return None,
                Err(err) => Err(err),
            },
            other => Err(UnitError::InvalidAction(other.to_string())),
        };

        match result {
            Ok(reply) => Some(reply),
            Err(err) => {
                RequestFailed {
                    work_id: req.work_id.as_str(),
                    action: &req.action,
                    error: &err,
                }
                .log();
                Some(ResponseEnvelope::failure(req.request_id, req.work_id, &err))
            }
        }
    }

    fn task(&self, work_id: &WorkId) -> Result<Arc<Task>, UnitError> {
        self.tasks
            .get(work_id)
            .ok_or_else(|| UnitError::UnitNotExist(work_id.to_string()))
    }

    fn object(&self, suffix: &str) -> String {
        format!("{}.{}", self.config.unit_name, suffix)
    }

    async fn setup(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, UnitError> {
        let mut next_instance = self.control.lock().await;
        let unit = self.config.unit_name.as_str();

        if req.work_id.unit() != unit {
            return Err(UnitError::UnitNotExist(req.work_id.to_string()));
        }
        if self.tasks.len() >= self.config.task_count_limit {
            return Err(UnitError::TaskFull(format!(
                "unit '{}' already runs {} task(s)",
                unit, self.config.task_count_limit
            )));
        }

        let work_id = if req.work_id.is_unit_scoped() {
            loop {
                let candidate = WorkId::new(unit, *next_instance);
                *next_instance = next_instance.wrapping_add(1);
                if !self.tasks.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            if req.work_id.instance().is_none() {
                return Err(UnitError::UnitNotExist(req.work_id.to_string()));
            }
            if self.tasks.contains(&req.work_id) {
                return Err(UnitError::TaskFull(format!("'{}' is already set up", req.work_id)));
            }
            req.work_id.clone()
        };

        let setup = SetupRequest::from_value(&req.data)?;
        let task = Arc::new(Task::load(work_id.clone(), &self.config, setup, &self.deps)?);
        task.set_request_id(&req.request_id);

        // Registered before inputs are wired so the first delivery finds it.
        self.tasks.insert(work_id.clone(), task.clone());
        if let Err(err) = task.connect(&self.tasks.handler_for(work_id.clone())) {
            self.tasks.remove(&work_id);
            task.destroy().await;
            return Err(err);
        }

        let inputs = task.inputs();
        TaskSetUp {
            work_id: work_id.as_str(),
            model: task.model(),
            inputs: &inputs,
        }
        .log();
        Ok(ResponseEnvelope::ack(req.request_id.clone(), work_id))
    }

    async fn work(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, UnitError> {
        let _control = self.control.lock().await;
        let task = self.task(&req.work_id)?;
        task.work(&self.tasks.handler_for(req.work_id.clone()))?;
        Ok(ResponseEnvelope::ack(req.request_id.clone(), req.work_id.clone()))
    }

    async fn pause(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, UnitError> {
        let _control = self.control.lock().await;
        self.task(&req.work_id)?.pause()?;
        Ok(ResponseEnvelope::ack(req.request_id.clone(), req.work_id.clone()))
    }

    async fn link(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, UnitError> {
        let _control = self.control.lock().await;
        let task = self.task(&req.work_id)?;
        let topic = topic_arg(&req.data)?;
        task.link(topic, &self.tasks.handler_for(req.work_id.clone()))?;
        Ok(ResponseEnvelope::ack(req.request_id.clone(), req.work_id.clone()))
    }

    async fn unlink(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, UnitError> {
        let _control = self.control.lock().await;
        let task = self.task(&req.work_id)?;
        task.unlink(topic_arg(&req.data)?);
        Ok(ResponseEnvelope::ack(req.request_id.clone(), req.work_id.clone()))
    }

    fn taskinfo(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, UnitError> {
        if req.work_id.unit() != self.config.unit_name {
            return Err(UnitError::UnitNotExist(req.work_id.to_string()));
        }

        if req.work_id.is_unit_scoped() {
            let ids: Vec<String> = self.tasks.ids().iter().map(WorkId::to_string).collect();
            return Ok(ResponseEnvelope::success(
                req.request_id.clone(),
                req.work_id.clone(),
                self.object("tasklist"),
                json!(ids),
            ));
        }

        let info = self.task(&req.work_id)?.info();
        Ok(ResponseEnvelope::success(
            req.request_id.clone(),
            req.work_id.clone(),
            self.object("taskinfo"),
            serde_json::to_value(info)?,
        ))
    }

    async fn exit(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, UnitError> {
        let _control = self.control.lock().await;
        let task = self
            .tasks
            .remove(&req.work_id)
            .ok_or_else(|| UnitError::UnitNotExist(req.work_id.to_string()))?;
        task.destroy().await;
        TaskExited {
            work_id: req.work_id.as_str(),
        }
        .log();
        Ok(ResponseEnvelope::ack(req.request_id.clone(), req.work_id.clone()))
    }

    fn inference(&self, req: &RequestEnvelope) -> Result<(), UnitError> {
        let task = self.task(&req.work_id)?;
        task.set_request_id(&req.request_id);
        task.submit(self.config.control_topic(), &req.object, &req.data)?;
        Ok(())
    }

    /// Publish a reply on the unit's reply topic.
    pub fn reply(&self, reply: &ResponseEnvelope) -> Result<(), BusError> {
        let raw = serde_json::to_vec(reply)?;
        self.deps.bus.publish(&self.config.reply_topic, raw).map_err(|err| {
            DeliveryFailed {
                work_id: reply.work_id.as_str(),
                topic: &self.config.reply_topic,
                error: &err,
            }
            .log();
            err
        })
    }

    /// Exit every live task and stop the control loop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let _control = self.control.lock().await;

        let tasks = self.tasks.drain();
        let count = tasks.len();
        for task in tasks {
            task.destroy().await;
            TaskExited {
                work_id: task.work_id().as_str(),
            }
            .log();
        }
        ControllerStopped {
            unit: &self.config.unit_name,
            tasks: count,
        }
        .log();
    }

    /// Subscribe to the control topic. Requests are handled one at a time by
    /// the returned loop.
    pub fn listen(self: &Arc<Self>) -> Result<ControlLoop, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.deps.bus.subscribe(
            self.config.control_topic(),
            Arc::new(move |msg: BusMessage| {
                // Receiver gone means the loop already stopped.
                let _ = tx.send(msg.payload);
            }),
        )?;

        Ok(ControlLoop {
            controller: self.clone(),
            requests: rx,
            subscription,
        })
    }
}

/// `link`/`unlink` carry the upstream topic as a bare string in `data`.
fn topic_arg(data: &Value) -> Result<&str, UnitError> {
    match data.as_str() {
        Some(topic) if !topic.is_empty() => Ok(topic),
        _ => Err(UnitError::ConfigParse(
            "expected the topic as a string in data".to_string(),
        )),
    }
}

/// Serve loop returned by [`UnitController::listen`].
pub struct ControlLoop {
    controller: Arc<UnitController>,
    requests: mpsc::UnboundedReceiver<Vec<u8>>,
    subscription: SubscriptionId,
}

impl ControlLoop {
    /// Control-topic subscription feeding this loop. Cancelling it lets the
    /// loop finish the requests already received and then return.
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Handle requests until [`UnitController::shutdown`] is called or the
    /// control subscription is cancelled.
    pub async fn run(mut self) {
        let cancelled = self.controller.shutdown.clone();
        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                next = self.requests.recv() => {
                    let Some(raw) = next else { break };
                    if let Some(reply) = self.controller.handle_raw(&raw).await {
                        let _ = self.controller.reply(&reply);
                    }
                }
            }
        }
        self.controller.deps.bus.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::StubFactory;
    use crate::bus::{LocalBus, StaticRegistry};
    use crate::config::ModelConfig;

    fn controller(limit: usize) -> UnitController {
        let mut config = UnitConfig::new("yolo").with_model("rec", ModelConfig::new("recording"));
        config.task_count_limit = limit;
        UnitController::new(
            config,
            Arc::new(LocalBus::new()),
            Arc::new(StaticRegistry::new()),
            Arc::new(StubFactory::default()),
        )
    }

    fn request(work_id: &str, action: &str, data: Value) -> RequestEnvelope {
        RequestEnvelope::new("1", work_id, action, "None", data)
    }

    #[tokio::test]
    async fn test_setup_allocates_instance_ids() {
        let ctl = controller(2);

        let first = ctl
            .handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert!(first.is_ok());
        assert_eq!(first.work_id, WorkId::from("yolo.1000"));

        let second = ctl
            .handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert_eq!(second.work_id, WorkId::from("yolo.1001"));
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_concrete_setup_is_task_full() {
        let ctl = controller(2);
        let ok = ctl
            .handle_request(request("yolo.1000", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert!(ok.is_ok());

        let dup = ctl
            .handle_request(request("yolo.1000", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert_eq!(dup.error.code, -21);
        assert_eq!(ctl.tasks().len(), 1);

        // Allocation skips ids that were claimed explicitly.
        let next = ctl
            .handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert_eq!(next.work_id, WorkId::from("yolo.1001"));
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn test_task_count_limit() {
        let ctl = controller(1);
        ctl.handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        let full = ctl
            .handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert_eq!(full.error.code, -21);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn test_setup_for_other_unit_is_rejected() {
        let ctl = controller(1);
        let resp = ctl
            .handle_request(request("kws", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert_eq!(resp.error.code, -6);
    }

    #[tokio::test]
    async fn test_failed_setup_leaves_no_task() {
        let ctl = controller(1);

        let bad_json = ctl
            .handle_request(request("yolo", "setup", json!({"response_format": "x"})))
            .await
            .unwrap();
        assert_eq!(bad_json.error.code, -2);

        let bad_link = ctl
            .handle_request(request(
                "yolo",
                "setup",
                json!({"model": "rec", "input": "camera.1000"}),
            ))
            .await
            .unwrap();
        assert_eq!(bad_link.error.code, -20);
        assert!(ctl.tasks().is_empty());
        assert!(ctl.deps.registry.lookup("yolo.1000.out_port").is_none());
    }

    #[tokio::test]
    async fn test_unknown_action_and_unknown_task() {
        let ctl = controller(1);
        let resp = ctl.handle_request(request("yolo.1000", "dance", Value::Null)).await.unwrap();
        assert_eq!(resp.error.code, -3);
        assert_eq!(resp.object, "None");

        let resp = ctl.handle_request(request("yolo.1000", "exit", Value::Null)).await.unwrap();
        assert_eq!(resp.error.code, -6);
    }

    #[tokio::test]
    async fn test_malformed_envelope_gets_parse_error() {
        let ctl = controller(1);
        let resp = ctl.handle_raw(b"{\"action\":").await.unwrap();
        assert_eq!(resp.error.code, -2);
        assert_eq!(resp.work_id, WorkId::from("yolo"));
    }

    #[tokio::test]
    async fn test_link_requires_topic_string() {
        let ctl = controller(1);
        ctl.handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        let resp = ctl
            .handle_request(request("yolo.1000", "link", json!({"topic": "camera.1000"})))
            .await
            .unwrap();
        assert_eq!(resp.error.code, -2);
        ctl.shutdown().await;
    }

    #[tokio::test]
    async fn test_exit_removes_task() {
        let ctl = controller(1);
        ctl.handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        let resp = ctl.handle_request(request("yolo.1000", "exit", Value::Null)).await.unwrap();
        assert!(resp.is_ok());
        assert!(ctl.tasks().is_empty());

        // The freed slot can be reused.
        let again = ctl
            .handle_request(request("yolo", "setup", json!({"model": "rec"})))
            .await
            .unwrap();
        assert!(again.is_ok());
        ctl.shutdown().await;
    }

    #[test]
    fn test_stale_handler_is_ignored() {
        let table = TaskTable::new();
        let handler = table.handler_for(WorkId::from("yolo.1000"));
        handler(BusMessage {
            topic: "yolo.1000".to_string(),
            payload: b"{}".to_vec(),
        });
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_every_task() {
        let ctl = controller(3);
        for _ in 0..3 {
            ctl.handle_request(request("yolo", "setup", json!({"model": "rec"})))
                .await
                .unwrap();
        }
        assert_eq!(ctl.tasks().len(), 3);

        ctl.shutdown().await;
        assert!(ctl.tasks().is_empty());
    }
}
