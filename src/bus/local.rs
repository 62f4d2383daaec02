// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::errors::BusError;
use crate::traits::{BusClient, BusMessage, MessageHandler, SubscriptionId};

/// Topic-addressed bus that delivers synchronously on the publisher's thread.
///
/// Handlers are cloned out of the subscriber table before they run, so a handler
/// may itself subscribe, unsubscribe or publish.
#[derive(Default)]
pub struct LocalBus {
    state: RwLock<BusState>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

#[derive(Default)]
struct BusState {
    subscribers: HashMap<String, Vec<(SubscriptionId, MessageHandler)>>,
    topics: HashMap<SubscriptionId, String>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse all further publishes and subscriptions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.get(topic).map_or(0, Vec::len)
    }
}

impl BusClient for LocalBus {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let handlers: Vec<MessageHandler> = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            state
                .subscribers
                .get(topic)
                .map(|subs| subs.iter().map(|(_, handler)| handler.clone()).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            handler(BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<SubscriptionId, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        state.topics.insert(id, topic.to_string());
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let Some(topic) = state.topics.remove(&id) else {
            return;
        };
        if let Some(subs) = state.subscribers.get_mut(&topic) {
            subs.retain(|(sub_id, _)| *sub_id != id);
            if subs.is_empty() {
                state.subscribers.remove(&topic);
            }
        }
    }
}
