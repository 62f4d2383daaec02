// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Task orchestration: channels, stream reassembly, bounded inference queues,
//! the task lifecycle and the unit controller that drives it.
//!
//! ```text
//! bus -> UnitController -> Task -> StreamReassembler -> InferenceQueue
//!                                                          |
//!                              bus <- Channel <- engine <- worker
//! ```

pub mod accelerator;
pub mod channel;
pub mod controller;
pub mod queue;
pub mod reassembler;
pub mod task;


pub use accelerator::{AcceleratorContext, AcceleratorDriver, AcceleratorLease, NoopAccelerator};
pub use channel::Channel;
pub use controller::{ControlLoop, TaskTable, UnitController};
pub use queue::{InferenceQueue, InferenceWorker, JobHandler, PutOutcome};
pub use reassembler::StreamReassembler;
pub use task::{SubmitOutcome, Task, TaskDeps, TaskInfo, TaskState};
