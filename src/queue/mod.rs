//! Per-destination outbound queue

pub mod priority;

pub use priority::{PriorityQueue, QueueEntry, DEFAULT_QUEUE_SIZE};
