use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};

use crossbeam_utils::Backoff;
use log::trace;
use parking_lot::Mutex;

use crate::queue::{BoundedQueue, OverflowPolicy, QueueConfig, QueueSize};

use super::{DrainJob, StealerHandle};

const LOCAL_BUFFER_SIZE: usize = QueueSize::K003.slots();
/// At most one registration per local buffer is ever queued, so the
/// registration ring is sized to the buffer limit.
const MAX_LOCAL_BUFFERS: usize = QueueSize::K003.slots();
const REGISTRATION_SIZE: usize = MAX_LOCAL_BUFFERS;

/// A queue that hands its overflow to a [`StealerPool`](super::StealerPool)
/// instead of making producers wait.
pub type WorkStealingQueue<T> = BoundedQueue<T, WorkStealing<T>>;

impl<T: Send + 'static> BoundedQueue<T, WorkStealing<T>> {
    /// Create a work stealing queue whose redistributed items collect in a
    /// steal buffer of at least `steal_size` items
    pub fn work_stealing(config: &QueueConfig, steal_size: usize, stealers: &StealerHandle) -> Self {
        Self::with_policy(config, WorkStealing::new(steal_size, stealers))
    }
}

/// Overflow policy that diverts items through per-thread buffers and the
/// stealer pool.
///
/// A producer that cannot get into the ring drops its item into a small
/// buffer owned by its own thread (so there is no contention there),
/// registers that buffer and schedules a drain job. A stealer thread later
/// moves the buffered items into the steal buffer, which consumers read
/// whenever the ring itself is empty.
///
/// The hand-off never blocks. It declines the item when the thread's buffer
/// is full, or when 32 other threads already hold a buffer on this queue.
/// A buffer is released once a stealer empties it and its thread is not
/// using it, so short-lived producer threads do not pile up.
///
/// If the pool stops while items are still on their way, they are kept in a
/// spill list that consumers read after the steal buffer.
pub struct WorkStealing<T> {
    state: Arc<StealState<T>>,
}

impl<T: Send + 'static> WorkStealing<T> {
    pub fn new(steal_size: usize, stealers: &StealerHandle) -> Self {
        Self {
            state: Arc::new(StealState {
                steal_buffer: BoundedQueue::new(steal_size),
                spill: Mutex::new(VecDeque::new()),
                spilled: AtomicUsize::new(0),
                registrations: BoundedQueue::new(REGISTRATION_SIZE),
                local_buffers: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                scheduled: AtomicBool::new(false),
                detached: AtomicBool::new(false),
                stealers: stealers.clone(),
            }),
        }
    }

    /// Items handed off that have not reached the steal buffer yet
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// Items already redistributed and waiting for a consumer
    pub fn stolen(&self) -> usize {
        self.state.steal_buffer.len() + self.state.spilled.load(Ordering::Acquire)
    }

    /// Threads currently holding a local buffer on this queue
    pub fn local_buffers(&self) -> usize {
        self.state.local_buffers.lock().len()
    }
}

impl<T: Send + 'static> OverflowPolicy<T> for WorkStealing<T> {
    fn overflow(&self, value: T) -> Result<(), T> {
        let state = &self.state;
        if !state.stealers.is_active() {
            return Err(value);
        }
        let Some(buffer) = state.local_buffer() else {
            return Err(value);
        };

        state.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Err(value) = buffer.items.try_push(value) {
            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(value);
        }
        if !buffer.registered.swap(true, Ordering::SeqCst) {
            state.register(buffer);
        }
        StealState::schedule(state);
        Ok(())
    }

    fn underflow(&self) -> Option<T> {
        let state = &self.state;
        if let Some(item) = state.take_stolen() {
            return Some(item);
        }
        if !state.stealers.is_active() && state.registrations.readable() {
            // nobody else will move these any more
            state.drain_registered(false);
            return state.take_stolen();
        }
        None
    }

    /// Deliberately conservative: it can report data that is still moving,
    /// but never misses data that a pop could eventually retrieve.
    fn pending(&self) -> bool {
        let state = &self.state;
        state.steal_buffer.readable()
            || state.spilled.load(Ordering::Acquire) > 0
            || state.stealers.has_pending()
            || state.registrations.readable()
            || state.in_flight.load(Ordering::Acquire) > 0
    }

    fn accepting(&self) -> bool {
        let state = &self.state;
        if !state.stealers.is_active() {
            return false;
        }
        let room_here = {
            let buffers = state.local_buffers.lock();
            match buffers.get(&thread::current().id()) {
                Some(buffer) => buffer.items.writable(),
                None => buffers.len() < MAX_LOCAL_BUFFERS,
            }
        };
        // a full buffer still frees up while stealers can deliver
        room_here
            || (state.in_flight.load(Ordering::Acquire) > 0 && state.steal_buffer.writable())
    }
}

impl<T> Drop for WorkStealing<T> {
    fn drop(&mut self) {
        self.state.detached.store(true, Ordering::Release);
        self.state.steal_buffer.shutdown();
    }
}

struct LocalBuffer<T> {
    owner: ThreadId,
    items: BoundedQueue<T>,
    /// Set while a registration for this buffer is queued
    registered: AtomicBool,
}

struct StealState<T> {
    steal_buffer: BoundedQueue<T>,
    /// Items a stealer could not deliver because the pool was stopping
    spill: Mutex<VecDeque<T>>,
    spilled: AtomicUsize,
    registrations: BoundedQueue<Arc<LocalBuffer<T>>>,
    local_buffers: Mutex<HashMap<ThreadId, Arc<LocalBuffer<T>>>>,
    in_flight: AtomicUsize,
    /// Set while a drain job for this queue is queued and not yet started
    scheduled: AtomicBool,
    /// Set once the owning queue is gone; stealers then discard instead of
    /// waiting on a steal buffer nobody reads.
    detached: AtomicBool,
    stealers: StealerHandle,
}

impl<T: Send + 'static> StealState<T> {
    fn local_buffer(&self) -> Option<Arc<LocalBuffer<T>>> {
        let owner = thread::current().id();
        let mut buffers = self.local_buffers.lock();
        if let Some(buffer) = buffers.get(&owner) {
            return Some(buffer.clone());
        }
        if buffers.len() >= MAX_LOCAL_BUFFERS {
            // idle buffers of threads that are gone, or just not overflowing
            buffers.retain(|_, buffer| {
                Arc::strong_count(buffer) > 1
                    || buffer.registered.load(Ordering::SeqCst)
                    || buffer.items.readable()
            });
            if buffers.len() >= MAX_LOCAL_BUFFERS {
                return None;
            }
        }
        let buffer = Arc::new(LocalBuffer {
            owner,
            items: BoundedQueue::new(LOCAL_BUFFER_SIZE),
            registered: AtomicBool::new(false),
        });
        buffers.insert(owner, buffer.clone());
        Some(buffer)
    }

    fn register(&self, buffer: Arc<LocalBuffer<T>>) {
        // the ring holds one entry per live buffer, so this only ever
        // retries on contention
        let backoff = Backoff::new();
        let mut buffer = buffer;
        while let Err(returned) = self.registrations.try_push(buffer) {
            buffer = returned;
            backoff.snooze();
        }
    }

    fn schedule(state: &Arc<Self>) {
        if state.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let job: Arc<dyn DrainJob> = state.clone();
        let queued = state.stealers.try_submit(job).is_ok();
        if !queued || !state.stealers.is_active() {
            // no stealer is certain to pick this up, move what we can now
            state.scheduled.store(false, Ordering::SeqCst);
            state.drain_registered(false);
        }
    }

    fn take_stolen(&self) -> Option<T> {
        if let Some(item) = self.steal_buffer.try_pop() {
            return Some(item);
        }
        if self.spilled.load(Ordering::Acquire) == 0 {
            return None;
        }
        let item = self.spill.lock().pop_front()?;
        self.spilled.fetch_sub(1, Ordering::AcqRel);
        Some(item)
    }

    /// Empties every registered buffer into the steal buffer. With `wait`
    /// set a full steal buffer is waited out for as long as the pool runs;
    /// otherwise, or once the pool stops, undeliverable items are spilled.
    fn drain_registered(&self, wait: bool) {
        self.scheduled.store(false, Ordering::SeqCst);
        let mut moved = 0usize;
        while self.registrations.readable() {
            let Some(buffer) = self.registrations.try_pop() else {
                continue;
            };
            // cleared first, so an item pushed from here on registers again
            buffer.registered.store(false, Ordering::SeqCst);
            while buffer.items.readable() {
                if let Some(item) = buffer.items.try_pop() {
                    self.deliver(item, wait);
                    moved += 1;
                }
            }
            self.retire(&buffer);
        }
        if moved > 0 {
            trace!("Stealer moved {} items into steal buffer", moved);
        }
    }

    fn deliver(&self, item: T, wait: bool) {
        let backoff = Backoff::new();
        let mut item = item;
        loop {
            item = match self.steal_buffer.try_push(item) {
                Ok(()) => break,
                Err(returned) => returned,
            };
            if self.detached.load(Ordering::Acquire) {
                break;
            }
            if !wait || !self.stealers.is_active() {
                self.spill.lock().push_back(item);
                self.spilled.fetch_add(1, Ordering::AcqRel);
                break;
            }
            backoff.snooze();
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Forgets `buffer` if it is empty and nothing but the map and this
    /// drain refers to it. The owner clones it under the same lock, so it
    /// cannot be mid hand-off.
    fn retire(&self, buffer: &Arc<LocalBuffer<T>>) {
        let mut buffers = self.local_buffers.lock();
        if Arc::strong_count(buffer) == 2
            && !buffer.registered.load(Ordering::SeqCst)
            && !buffer.items.readable()
            && buffers
                .get(&buffer.owner)
                .is_some_and(|mapped| Arc::ptr_eq(mapped, buffer))
        {
            buffers.remove(&buffer.owner);
            trace!("Released local steal buffer of {:?}", buffer.owner);
        }
    }
}

impl<T: Send + 'static> DrainJob for StealState<T> {
    fn drain(&self) {
        self.drain_registered(true);
    }
}
