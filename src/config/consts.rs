/// Jobs buffered per task before new input is dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;
/// Concurrent tasks per unit
pub const DEFAULT_TASK_COUNT_LIMIT: usize = 1;
/// First instance number handed out when a setup addresses the bare unit name
pub const DEFAULT_FIRST_INSTANCE_ID: u32 = 1000;
/// Topic that user-facing replies and enabled task output are published on
pub const DEFAULT_REPLY_TOPIC: &str = "sys.response";
