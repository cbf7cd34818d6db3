/// Hooks a [`BoundedQueue`](super::BoundedQueue) consults when its ring cannot
/// take or give an item.
///
/// The policy is fixed at construction, so the fast path pays for no dynamic
/// dispatch.
pub trait OverflowPolicy<T>: Send + Sync {
    /// Called when a push exhausted its retries or found the ring full.
    /// Returns the value back if the policy could not take it either.
    fn overflow(&self, value: T) -> Result<(), T>;

    /// Called when a pop exhausted its retries or found the ring empty.
    fn underflow(&self) -> Option<T>;

    /// Whether the policy holds (or is moving) items a later pop will see.
    fn pending(&self) -> bool;

    /// Whether an overflow from the calling thread could succeed now or
    /// shortly without any consumer activity. A blocking push keeps retrying
    /// instead of parking while this holds.
    fn accepting(&self) -> bool {
        false
    }
}

/// The plain ring: nothing happens beyond the ring itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverflow;

impl<T> OverflowPolicy<T> for NoOverflow {
    fn overflow(&self, value: T) -> Result<(), T> {
        Err(value)
    }

    fn underflow(&self) -> Option<T> {
        None
    }

    fn pending(&self) -> bool {
        false
    }
}
