use std::default::Default;

use super::QueueSize;

/// Number of failed lock-free attempts before a push or pop falls back to its
/// overflow/underflow hook.
pub const DEFAULT_RETRY: usize = 10;

/// Contains Config properties used to build a [`BoundedQueue`](super::BoundedQueue)
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Requested capacity, rounded up to the next [`QueueSize`]
    pub size: usize,
    /// Contended claim attempts tolerated before giving up on the ring
    pub retry: usize,
}

impl QueueConfig {
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }
}

impl From<QueueSize> for QueueConfig {
    fn from(size: QueueSize) -> Self {
        Self::with_size(size.slots())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            size: QueueSize::K2.slots(),
            retry: DEFAULT_RETRY,
        }
    }
}
