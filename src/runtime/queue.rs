// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded inference queue and the worker that drains it.
//!
//! The producer side (`put`) never blocks: when `capacity` jobs are already
//! waiting, the new job is dropped and the caller told so. The worker is the
//! only consumer and runs jobs one at a time in submission order.
//!
//! Shutdown is cooperative. [`InferenceWorker::stop`] appends a sentinel that
//! bypasses the capacity check and waits for the worker to reach it, so jobs
//! already buffered still run and the engine is dropped on the worker before
//! `stop` returns.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::observability::messages::queue::{WorkerJoinFailed, WorkerStarted, WorkerStopped};
use crate::observability::messages::StructuredLog;

/// Result of [`InferenceQueue::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Queued,
    /// Queue full or already shut down; the job was discarded.
    Dropped,
}

enum Slot<T> {
    Job(T),
    Shutdown,
}

struct QueueState<T> {
    slots: VecDeque<Slot<T>>,
    jobs: usize,
    closed: bool,
}

pub struct InferenceQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Notify,
    capacity: usize,
}

impl<T> InferenceQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                slots: VecDeque::new(),
                jobs: 0,
                closed: false,
            }),
            available: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting, excluding the shutdown sentinel.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).jobs
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed
    }

    pub fn put(&self, job: T) -> PutOutcome {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed || state.jobs >= self.capacity {
                return PutOutcome::Dropped;
            }
            state.slots.push_back(Slot::Job(job));
            state.jobs += 1;
        }
        self.available.notify_one();
        PutOutcome::Queued
    }

    /// Append the shutdown sentinel. Later `put`s are dropped.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return;
            }
            state.closed = true;
            state.slots.push_back(Slot::Shutdown);
        }
        self.available.notify_one();
    }

    /// Wait for the next job. `None` means the sentinel was reached.
    pub async fn get(&self) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                match state.slots.pop_front() {
                    Some(Slot::Job(job)) => {
                        state.jobs -= 1;
                        return Some(job);
                    }
                    Some(Slot::Shutdown) => return None,
                    None => {}
                }
            }
            self.available.notified().await;
        }
    }
}

/// Consumer side of a worker: called once per job, serially.
#[async_trait]
pub trait JobHandler<T: Send + 'static>: Send + 'static {
    async fn handle(&mut self, job: T);
}

/// Owns the single task draining one [`InferenceQueue`].
pub struct InferenceWorker<T> {
    work_id: String,
    queue: Arc<InferenceQueue<T>>,
    handle: JoinHandle<u64>,
}

impl<T: Send + 'static> InferenceWorker<T> {
    /// Create a queue of `capacity` and start draining it into `handler`.
    ///
    /// The queue is created here so no second consumer can ever attach to it.
    pub fn start<H>(work_id: impl Into<String>, capacity: usize, mut handler: H) -> Self
    where
        H: JobHandler<T>,
    {
        let work_id = work_id.into();
        let queue = Arc::new(InferenceQueue::new(capacity));
        let consumer = queue.clone();
        let id = work_id.clone();

        let handle = tokio::spawn(async move {
            WorkerStarted { work_id: &id }.log();
            let mut processed = 0u64;
            while let Some(job) = consumer.get().await {
                handler.handle(job).await;
                processed += 1;
            }
            WorkerStopped {
                work_id: &id,
                processed,
            }
            .log();
            processed
        });

        Self {
            work_id,
            queue,
            handle,
        }
    }

    pub fn queue(&self) -> Arc<InferenceQueue<T>> {
        self.queue.clone()
    }

    pub fn put(&self, job: T) -> PutOutcome {
        self.queue.put(job)
    }

    /// Send the sentinel and wait for the worker to exit. Returns the number of
    /// jobs it processed.
    pub async fn stop(self) -> u64 {
        self.queue.close();
        match self.handle.await {
            Ok(processed) => processed,
            Err(err) => {
                WorkerJoinFailed {
                    work_id: &self.work_id,
                    error: &err,
                }
                .log();
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        delay: Duration,
        seen: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl JobHandler<u32> for Recorder {
        async fn handle(&mut self, job: u32) {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen.lock().unwrap().push(job);
        }
    }

    #[tokio::test]
    async fn test_overflow_keeps_first_n_in_fifo_order() {
        let queue = InferenceQueue::new(3);
        let outcomes: Vec<PutOutcome> = (1..=5).map(|job| queue.put(job)).collect();

        assert_eq!(
            outcomes,
            vec![
                PutOutcome::Queued,
                PutOutcome::Queued,
                PutOutcome::Queued,
                PutOutcome::Dropped,
                PutOutcome::Dropped
            ]
        );
        assert_eq!(queue.len(), 3);

        queue.close();
        assert_eq!(queue.get().await, Some(1));
        assert_eq!(queue.get().await, Some(2));
        assert_eq!(queue.get().await, Some(3));
        assert_eq!(queue.get().await, None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_put_after_close_is_dropped() {
        let queue = InferenceQueue::new(3);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.put(1), PutOutcome::Dropped);
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn test_get_waits_for_put() {
        let queue = Arc::new(InferenceQueue::new(1));
        let producer = queue.clone();
        let waiter = tokio::spawn(async move { queue.get().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(producer.put(42), PutOutcome::Queued);
        assert_eq!(waiter.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_slow_worker_processes_first_three_of_five() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = InferenceWorker::start(
            "test.1000",
            3,
            Recorder {
                delay: Duration::from_millis(50),
                seen: seen.clone(),
            },
        );

        // The current-thread test runtime does not poll the worker until we
        // await, so all five puts race against a full queue.
        let outcomes: Vec<PutOutcome> = (1..=5).map(|job| worker.put(job)).collect();
        assert_eq!(
            outcomes.iter().filter(|o| **o == PutOutcome::Dropped).count(),
            2
        );

        let queue = worker.queue();
        let processed = worker.stop().await;

        assert_eq!(processed, 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert!(queue.is_empty());
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_stop_on_idle_worker_returns_promptly() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = InferenceWorker::start(
            "idle.1000",
            3,
            Recorder {
                delay: Duration::ZERO,
                seen: seen.clone(),
            },
        );
        tokio::task::yield_now().await;

        let processed = tokio::time::timeout(Duration::from_secs(1), worker.stop())
            .await
            .expect("worker should observe the sentinel");
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn test_jobs_run_serially_in_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = InferenceWorker::start(
            "order.1000",
            8,
            Recorder {
                delay: Duration::from_millis(1),
                seen: seen.clone(),
            },
        );

        for job in 0..8 {
            assert_eq!(worker.put(job), PutOutcome::Queued);
            tokio::task::yield_now().await;
        }
        worker.stop().await;

        assert_eq!(*seen.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }
}
