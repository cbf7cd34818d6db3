mod bounded_queue;
mod overflow_policy;
mod queue_config;
mod queue_size;
mod wait_gate;

pub use bounded_queue::BoundedQueue;
pub use overflow_policy::{NoOverflow, OverflowPolicy};
pub use queue_config::{QueueConfig, DEFAULT_RETRY};
pub use queue_size::{proper_size, QueueSize};

pub(crate) use wait_gate::WaitGate;
