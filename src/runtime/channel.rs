// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-task output framing and input subscriptions.
//!
//! Every result a task produces goes out through its [`Channel`]:
//!
//! * always on `<work_id>.out_port`, where linked downstream tasks listen
//! * additionally on the unit's reply topic while output is enabled
//!
//! In stream mode each payload is wrapped as `{index, delta, finish}`. The
//! index counter belongs to the channel and is advanced under the same lock
//! that publishes, so concurrent senders (the worker and an exiting control
//! path) never interleave or reuse an index.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::{BusError, UnitError};
use crate::observability::messages::channel::{DeliveryFailed, Subscribed, Unsubscribed};
use crate::observability::messages::StructuredLog;
use crate::protocol::codec::encode_base64;
use crate::protocol::{framed_object, is_base64_format, Payload, ResponseEnvelope, WorkId};
use crate::traits::{BusClient, MessageHandler, Registry, SubscriptionId};

pub struct Channel {
    work_id: WorkId,
    bus: Arc<dyn BusClient>,
    registry: Arc<dyn Registry>,
    reply_topic: String,
    output_enabled: AtomicBool,
    stream_enabled: AtomicBool,
    request_id: Mutex<String>,
    stream_index: Mutex<u64>,
    subscriptions: Mutex<HashMap<String, SubscriptionId>>,
}

impl Channel {
    pub fn new(
        work_id: WorkId,
        bus: Arc<dyn BusClient>,
        registry: Arc<dyn Registry>,
        reply_topic: impl Into<String>,
    ) -> Self {
        Self {
            work_id,
            bus,
            registry,
            reply_topic: reply_topic.into(),
            output_enabled: AtomicBool::new(true),
            stream_enabled: AtomicBool::new(false),
            request_id: Mutex::new(String::new()),
            stream_index: Mutex::new(0),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn work_id(&self) -> &WorkId {
        &self.work_id
    }

    pub fn set_output(&self, enabled: bool) {
        self.output_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn output_enabled(&self) -> bool {
        self.output_enabled.load(Ordering::SeqCst)
    }

    pub fn set_stream(&self, enabled: bool) {
        self.stream_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn stream_enabled(&self) -> bool {
        self.stream_enabled.load(Ordering::SeqCst)
    }

    pub fn set_request_id(&self, request_id: &str) {
        *self.request_id.lock().unwrap_or_else(PoisonError::into_inner) = request_id.to_string();
    }

    pub fn request_id(&self) -> String {
        self.request_id.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Frame and publish one result.
    ///
    /// `finish` closes the current stream and resets the index to 0; it is
    /// ignored when streaming is off. The published `object` carries the
    /// `stream` flag exactly when the data is chunk-framed. Delivery failures
    /// are logged and returned.
    pub fn send(&self, object: &str, payload: Payload, finish: bool) -> Result<(), BusError> {
        let mut index = self.stream_index.lock().unwrap_or_else(PoisonError::into_inner);
        let streaming = self.stream_enabled();
        let object = framed_object(object, streaming);
        let body = frame_payload(&object, payload);

        let data = if streaming {
            let data = json!({ "index": *index, "delta": body, "finish": finish });
            if finish {
                *index = 0;
            } else {
                *index += 1;
            }
            data
        } else {
            body
        };

        let envelope = ResponseEnvelope::success(self.request_id(), self.work_id.clone(), object, data);
        let raw = serde_json::to_vec(&envelope)?;

        let mut result = self.publish(&self.work_id.out_port(), raw.clone());
        if self.output_enabled() {
            result = result.and(self.publish(&self.reply_topic, raw));
        }
        result
    }

    /// Report an error to the caller on the reply topic. Does not touch the
    /// stream index and is not forwarded to linked tasks.
    pub fn send_error(&self, object: &str, err: &UnitError) -> Result<(), BusError> {
        let envelope =
            ResponseEnvelope::failure(self.request_id(), self.work_id.clone(), err).with_object(object);
        let raw = serde_json::to_vec(&envelope)?;
        self.publish(&self.reply_topic, raw)
    }

    fn publish(&self, topic: &str, raw: Vec<u8>) -> Result<(), BusError> {
        self.bus.publish(topic, raw).map_err(|err| {
            DeliveryFailed {
                work_id: self.work_id.as_str(),
                topic,
                error: &err,
            }
            .log();
            err
        })
    }

    /// Subscribe `handler` to a raw bus topic, replacing any earlier
    /// subscription under the same key.
    pub fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), BusError> {
        self.subscribe_keyed(topic, topic, handler)
    }

    /// Subscribe to another task's output by work id, resolved through the
    /// registry. An empty `work_id` means this task's own input topic, which
    /// accepts data from any sender.
    pub fn subscribe_work_id(&self, work_id: &str, handler: MessageHandler) -> Result<(), UnitError> {
        if work_id.is_empty() {
            let own = self.work_id.to_string();
            return self
                .subscribe_keyed(&own, &own, handler)
                .map_err(|err| UnitError::LinkFailed(err.to_string()));
        }

        let port = WorkId::from(work_id).out_port();
        let address = self
            .registry
            .lookup(&port)
            .ok_or_else(|| UnitError::LinkFailed(format!("'{}' is not registered", work_id)))?;
        self.subscribe_keyed(work_id, &address, handler)
            .map_err(|err| UnitError::LinkFailed(err.to_string()))
    }

    fn subscribe_keyed(&self, key: &str, address: &str, handler: MessageHandler) -> Result<(), BusError> {
        let id = self.bus.subscribe(address, handler)?;
        let previous = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), id);
        if let Some(previous) = previous {
            self.bus.unsubscribe(previous);
        }
        Subscribed {
            work_id: self.work_id.as_str(),
            topic: key,
            address,
        }
        .log();
        Ok(())
    }

    /// Removing a topic that is not subscribed is a no-op.
    pub fn stop_subscriber(&self, topic: &str) {
        let removed = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic);
        if let Some(id) = removed {
            self.bus.unsubscribe(id);
            Unsubscribed {
                work_id: self.work_id.as_str(),
                topic,
            }
            .log();
        }
    }

    /// Counterpart of [`subscribe_work_id`](Self::subscribe_work_id).
    pub fn stop_subscriber_work_id(&self, work_id: &str) {
        if work_id.is_empty() {
            let own = self.work_id.to_string();
            self.stop_subscriber(&own);
        } else {
            self.stop_subscriber(work_id);
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(topic)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    /// Drop every subscription.
    pub fn close(&self) {
        let drained: Vec<(String, SubscriptionId)> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (topic, id) in drained {
            self.bus.unsubscribe(id);
            Unsubscribed {
                work_id: self.work_id.as_str(),
                topic: &topic,
            }
            .log();
        }
    }
}

/// Binary payloads are base64 text when the format asks for it, otherwise
/// UTF-8 (lossy) text.
fn frame_payload(object: &str, payload: Payload) -> Value {
    match payload {
        Payload::Json(value) => value,
        Payload::Bytes(bytes) if is_base64_format(object) => Value::String(encode_base64(&bytes)),
        Payload::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LocalBus, StaticRegistry};
    use crate::traits::BusMessage;

    fn capture(bus: &LocalBus, topic: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(
            topic,
            Arc::new(move |msg: BusMessage| {
                sink.lock().unwrap().push(serde_json::from_slice(&msg.payload).unwrap());
            }),
        )
        .unwrap();
        seen
    }

    fn channel(bus: &Arc<LocalBus>, registry: &Arc<StaticRegistry>) -> Channel {
        Channel::new(
            WorkId::from("yolo.1000"),
            bus.clone(),
            registry.clone(),
            "sys.response",
        )
    }

    #[test]
    fn test_whole_send_reaches_out_port_and_reply_topic() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let out = capture(&bus, "yolo.1000.out_port");
        let reply = capture(&bus, "sys.response");

        let ch = channel(&bus, &registry);
        ch.set_request_id("req-9");
        ch.send("yolo.box", Payload::text("cat"), true).unwrap();

        let out = out.lock().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["data"], "cat");
        assert_eq!(out[0]["request_id"], "req-9");
        assert_eq!(out[0]["error"]["code"], 0);
        assert_eq!(reply.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_output_disabled_only_feeds_out_port() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let out = capture(&bus, "yolo.1000.out_port");
        let reply = capture(&bus, "sys.response");

        let ch = channel(&bus, &registry);
        ch.set_output(false);
        ch.send("yolo.box", Payload::text("cat"), true).unwrap();

        assert_eq!(out.lock().unwrap().len(), 1);
        assert!(reply.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stream_index_advances_and_resets_on_finish() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let out = capture(&bus, "yolo.1000.out_port");

        let ch = channel(&bus, &registry);
        ch.set_stream(true);
        ch.send("yolo.box.stream", Payload::text("a"), false).unwrap();
        ch.send("yolo.box.stream", Payload::text("b"), false).unwrap();
        ch.send("yolo.box.stream", Payload::text("c"), true).unwrap();
        ch.send("yolo.box.stream", Payload::text("d"), true).unwrap();

        let out = out.lock().unwrap();
        let indexes: Vec<u64> = out.iter().map(|e| e["data"]["index"].as_u64().unwrap()).collect();
        assert_eq!(indexes, vec![0, 1, 2, 0]);
        assert_eq!(out[2]["data"]["finish"], true);
        assert_eq!(out[1]["data"]["delta"], "b");
    }

    #[test]
    fn test_published_object_matches_framing() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let out = capture(&bus, "yolo.1000.out_port");

        let ch = channel(&bus, &registry);
        ch.set_stream(true);
        ch.send("camera.raw", Payload::text("frame"), true).unwrap();
        ch.set_stream(false);
        ch.send("yolo.box.stream", Payload::text("cat"), true).unwrap();

        let out = out.lock().unwrap();
        assert_eq!(out[0]["object"], "camera.raw.stream");
        assert_eq!(out[0]["data"]["delta"], "frame");
        assert_eq!(out[1]["object"], "yolo.box");
        assert_eq!(out[1]["data"], "cat");
    }

    #[test]
    fn test_concurrent_senders_never_share_an_index() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let out = capture(&bus, "yolo.1000.out_port");

        let ch = Arc::new(channel(&bus, &registry));
        ch.set_stream(true);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let ch = ch.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        ch.send("x.stream", Payload::text("d"), false).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let indexes: Vec<u64> = out
            .lock()
            .unwrap()
            .iter()
            .map(|e| e["data"]["index"].as_u64().unwrap())
            .collect();
        assert_eq!(indexes, (0..100).collect::<Vec<u64>>());
    }

    #[test]
    fn test_bytes_are_base64_framed_when_requested() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let out = capture(&bus, "yolo.1000.out_port");

        let ch = channel(&bus, &registry);
        ch.send("tts.wav.base64", Payload::Bytes(b"hello".to_vec()), true).unwrap();
        ch.send("tts.text", Payload::Bytes(b"hello".to_vec()), true).unwrap();

        let out = out.lock().unwrap();
        assert_eq!(out[0]["data"], "aGVsbG8=");
        assert_eq!(out[1]["data"], "hello");
    }

    #[test]
    fn test_send_error_goes_to_reply_topic_only() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let out = capture(&bus, "yolo.1000.out_port");
        let reply = capture(&bus, "sys.response");

        let ch = channel(&bus, &registry);
        ch.set_output(false);
        ch.send_error("yolo.box", &UnitError::EmptyInput).unwrap();

        assert!(out.lock().unwrap().is_empty());
        let reply = reply.lock().unwrap();
        assert_eq!(reply[0]["error"]["code"], -24);
        assert_eq!(reply[0]["object"], "yolo.box");
    }

    #[test]
    fn test_send_on_closed_bus_returns_error() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let ch = channel(&bus, &registry);
        bus.close();

        assert_eq!(ch.send("x", Payload::text("y"), true), Err(BusError::Closed));
    }

    #[test]
    fn test_subscribe_work_id_resolves_through_registry() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        registry.insert("camera.1000.out_port", "camera.1000.out_port");
        let ch = channel(&bus, &registry);
        let noop: MessageHandler = Arc::new(|_| {});

        ch.subscribe_work_id("camera.1000", noop.clone()).unwrap();
        assert!(ch.is_subscribed("camera.1000"));
        assert_eq!(bus.subscriber_count("camera.1000.out_port"), 1);

        let err = ch.subscribe_work_id("depth.1000", noop.clone()).unwrap_err();
        assert_eq!(err.code(), -20);

        ch.subscribe_work_id("", noop).unwrap();
        assert_eq!(bus.subscriber_count("yolo.1000"), 1);
        assert_eq!(ch.subscribed_topics(), vec!["camera.1000", "yolo.1000"]);
    }

    #[test]
    fn test_stop_subscriber_is_idempotent() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let ch = channel(&bus, &registry);
        ch.subscribe("sys.pcm", Arc::new(|_| {})).unwrap();

        ch.stop_subscriber("sys.pcm");
        ch.stop_subscriber("sys.pcm");
        ch.stop_subscriber_work_id("never.subscribed");
        assert_eq!(bus.subscriber_count("sys.pcm"), 0);
    }

    #[test]
    fn test_resubscribe_replaces_previous_subscription() {
        let bus = Arc::new(LocalBus::new());
        let registry = Arc::new(StaticRegistry::new());
        let ch = channel(&bus, &registry);
        ch.subscribe("sys.pcm", Arc::new(|_| {})).unwrap();
        ch.subscribe("sys.pcm", Arc::new(|_| {})).unwrap();
        assert_eq!(bus.subscriber_count("sys.pcm"), 1);

        ch.close();
        assert_eq!(bus.subscriber_count("sys.pcm"), 0);
        assert!(ch.subscribed_topics().is_empty());
    }
}
