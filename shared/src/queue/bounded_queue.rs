use std::{
    cell::UnsafeCell,
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    thread,
};

use crossbeam_utils::{Backoff, CachePadded};

use super::{proper_size, NoOverflow, OverflowPolicy, QueueConfig, WaitGate};

/// Voluntary yields a blocking call makes before it parks on its gate.
const YIELD_BUDGET: usize = 1;

struct Slot<T> {
    /// `lap * capacity + index` when free for the producer of that lap,
    /// one more than that once the value is published.
    sequence: AtomicU64,
    value: UnsafeCell<Option<T>>,
}

// SAFETY: `value` is only touched by the single thread that won the cursor CAS
// for this slot, and hand-off between that thread and the next one is ordered
// by the release store / acquire load of `sequence`.
unsafe impl<T: Send> Sync for Slot<T> {}

/// A bounded multi-producer multi-consumer ring buffer.
///
/// Producers and consumers claim slots by advancing their own cursor with a
/// compare-and-swap; each slot's sequence counter tells a claimant whether the
/// slot is free for this lap (`sequence == cursor`) or holds a published value
/// (`sequence == cursor + 1`). No lock is taken on the fast path. Blocking
/// calls fall back to a per-direction [`WaitGate`] only after the lock-free
/// attempts and one yield fail.
///
/// What happens when the ring itself cannot take or give an item is decided
/// by the [`OverflowPolicy`] `P`: [`NoOverflow`] simply reports failure, the
/// work stealing policy diverts items through the stealer pool.
///
/// FIFO order holds between items that went through the ring. Items diverted
/// by a policy may be observed out of order relative to them.
pub struct BoundedQueue<T, P = NoOverflow> {
    slots: Box<[Slot<T>]>,
    mask: u64,
    producer: CachePadded<AtomicU64>,
    consumer: CachePadded<AtomicU64>,
    retry: usize,
    running: AtomicBool,
    producers: WaitGate,
    consumers: WaitGate,
    policy: P,
}

impl<T> BoundedQueue<T, NoOverflow> {
    /// Create a plain queue able to hold at least `size` items
    pub fn new(size: usize) -> Self {
        Self::with_config(&QueueConfig::with_size(size))
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self::with_policy(config, NoOverflow)
    }
}

impl<T, P: OverflowPolicy<T>> BoundedQueue<T, P> {
    /// Create a queue whose overflow and underflow are handled by `policy`
    pub fn with_policy(config: &QueueConfig, policy: P) -> Self {
        let capacity = proper_size(config.size);
        let slots = (0..capacity)
            .map(|index| Slot {
                sequence: AtomicU64::new(index as u64),
                value: UnsafeCell::new(None),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            mask: (capacity - 1) as u64,
            producer: CachePadded::new(AtomicU64::new(0)),
            consumer: CachePadded::new(AtomicU64::new(0)),
            retry: config.retry.max(1),
            running: AtomicBool::new(true),
            producers: WaitGate::new(),
            consumers: WaitGate::new(),
            policy,
        }
    }

    /// Pushes `value`, blocking while the queue is saturated.
    ///
    /// This never gives up: it does not observe [`shutdown`](Self::shutdown),
    /// so callers must stop producing before they tear the queue down.
    pub fn push(&self, value: T) {
        let backoff = Backoff::new();
        let mut value = value;
        let mut yields = YIELD_BUDGET;
        loop {
            value = match self.try_push(value) {
                Ok(()) => return,
                Err(value) => value,
            };
            if self.writable() {
                continue;
            }
            if self.policy.accepting() {
                backoff.snooze();
                continue;
            }
            if yields > 0 {
                yields -= 1;
                thread::yield_now();
                continue;
            }
            self.producers
                .wait_until(|| self.writable() || self.policy.accepting());
        }
    }

    /// Attempts to push `value` without blocking.
    ///
    /// When the ring is full, or the slot claim keeps losing races, the
    /// overflow policy gets a chance to take the value. If it declines the
    /// value is handed back.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let backoff = Backoff::new();
        let mut attempts = 0;
        loop {
            let head = self.producer.load(Ordering::Relaxed);
            let slot = self.slot(head);
            let sequence = slot.sequence.load(Ordering::Acquire);

            if sequence == head {
                if self
                    .producer
                    .compare_exchange_weak(head, head + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: winning the CAS while `sequence == head` gives this
                    // thread sole access to the slot until it republishes it.
                    unsafe {
                        *slot.value.get() = Some(value);
                    }
                    slot.sequence.store(head + 1, Ordering::Release);
                    self.consumers.notify_one();
                    return Ok(());
                }
            } else if sequence < head {
                // last lap's value is still unread
                self.consumers.notify_all();
                return self.overflow(value);
            }

            attempts += 1;
            if attempts >= self.retry {
                return self.overflow(value);
            }
            backoff.spin();
        }
    }

    /// Pops the next item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue has been shut down and nothing readable
    /// remains: the end-of-stream signal for consumers.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut yields = YIELD_BUDGET;
        loop {
            if let Some(value) = self.try_pop() {
                return Some(value);
            }
            if self.readable() {
                backoff.snooze();
                continue;
            }
            if !self.is_running() {
                return None;
            }
            if yields > 0 {
                yields -= 1;
                thread::yield_now();
                continue;
            }
            self.consumers
                .wait_until(|| self.readable() || !self.is_running());
        }
    }

    /// Attempts to pop an item without blocking, falling back to the
    /// underflow policy when the ring has nothing to give.
    pub fn try_pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut attempts = 0;
        loop {
            let tail = self.consumer.load(Ordering::Relaxed);
            let slot = self.slot(tail);
            let sequence = slot.sequence.load(Ordering::Acquire);

            if sequence == tail + 1 {
                if self
                    .consumer
                    .compare_exchange_weak(tail, tail + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: winning the CAS while `sequence == tail + 1` gives
                    // this thread sole access to the published value.
                    let value = unsafe { (*slot.value.get()).take() };
                    slot.sequence
                        .store(tail + self.slots.len() as u64, Ordering::Release);
                    self.producers.notify_one();
                    return value;
                }
            } else if sequence <= tail {
                // nothing published at the head of the ring
                return self.policy.underflow();
            }

            attempts += 1;
            if attempts >= self.retry {
                return self.policy.underflow();
            }
            backoff.spin();
        }
    }

    /// Whether a pop issued now could find data, in the ring or held by the
    /// overflow policy. Point-in-time only.
    pub fn readable(&self) -> bool {
        self.ring_readable() || self.policy.pending()
    }

    /// Whether the slot at the producer cursor is free. Point-in-time only.
    pub fn writable(&self) -> bool {
        let head = self.producer.load(Ordering::Acquire);
        self.slot(head).sequence.load(Ordering::Acquire) == head
    }

    /// Flags the queue as shutting down and wakes every sleeper. Consumers
    /// drain what is left, then receive `None`.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.producers.notify_all();
        self.consumers.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Approximate number of items sitting in the ring (not counting items
    /// held by the overflow policy).
    pub fn len(&self) -> usize {
        let tail = self.consumer.load(Ordering::Acquire);
        let head = self.producer.load(Ordering::Acquire);
        (head.saturating_sub(tail) as usize).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        !self.readable()
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn ring_readable(&self) -> bool {
        let tail = self.consumer.load(Ordering::Acquire);
        self.slot(tail).sequence.load(Ordering::Acquire) == tail + 1
    }

    fn overflow(&self, value: T) -> Result<(), T> {
        self.policy.overflow(value)?;
        self.consumers.notify_one();
        Ok(())
    }

    #[inline]
    fn slot(&self, cursor: u64) -> &Slot<T> {
        &self.slots[(cursor & self.mask) as usize]
    }
}

impl<T, P: OverflowPolicy<T>> fmt::Debug for BoundedQueue<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}
