//! Outbound message scheduling and fan-out

pub mod dispatcher;
pub mod handle;
pub mod message;

pub use dispatcher::{Dispatcher, DispatcherConfig, FanOut, TRAFFIC_BATCH_SIZE};
pub use handle::DispatchHandle;
pub use message::{MessageKind, MessagePolicy, OutboundMessage, POLICY_TABLE};
