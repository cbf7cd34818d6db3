use std::{
    default::Default,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};

use crate::queue::{BoundedQueue, QueueSize};

use super::StealerPoolError;

pub const DEFAULT_STEAL_THREADS: usize = 4;

/// A unit of overflow work the stealer threads run.
pub trait DrainJob: Send + Sync {
    /// Moves everything the job refers to into its destination buffer.
    fn drain(&self);
}

/// Contains Config properties used to start a [`StealerPool`]
#[derive(Debug, Clone)]
pub struct StealerConfig {
    /// Number of background threads. Zero yields an inactive pool, and
    /// work stealing queues built from it behave like plain queues.
    pub threads: usize,
    /// Capacity of the shared job ring
    pub job_queue_size: usize,
}

impl Default for StealerConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_STEAL_THREADS,
            job_queue_size: QueueSize::K1.slots(),
        }
    }
}

struct PoolShared {
    jobs: BoundedQueue<Arc<dyn DrainJob>>,
    active: AtomicBool,
}

impl PoolShared {
    fn work(&self) {
        while let Some(job) = self.jobs.pop() {
            job.drain();
        }
    }
}

/// A fixed set of threads that drain overflow buffers of every work
/// stealing queue built from its [`StealerHandle`].
///
/// The pool is owned by whoever creates it, usually the application root.
/// Dropping it runs [`shutdown`](Self::shutdown).
pub struct StealerPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
}

impl StealerPool {
    pub fn new(config: &StealerConfig) -> Result<Self, StealerPoolError> {
        let shared = Arc::new(PoolShared {
            jobs: BoundedQueue::new(config.job_queue_size),
            active: AtomicBool::new(config.threads > 0),
        });
        let mut pool = Self {
            shared,
            threads: Vec::with_capacity(config.threads),
        };

        for index in 0..config.threads {
            let shared = pool.shared.clone();
            let handle = thread::Builder::new()
                .name(format!("conduit-stealer-{}", index))
                .spawn(move || shared.work())
                .map_err(|source| StealerPoolError::Spawn { index, source })?;
            pool.threads.push(handle);
        }

        info!(
            "Stealer pool started with {} threads, job ring of {}",
            config.threads,
            pool.shared.jobs.capacity()
        );
        Ok(pool)
    }

    pub fn handle(&self) -> StealerHandle {
        StealerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Stops accepting hand-offs, lets the threads finish the queued jobs and
    /// joins them. Jobs that slipped in after the threads left run on the
    /// calling thread. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        let was_active = self.shared.active.swap(false, Ordering::AcqRel);
        self.shared.jobs.shutdown();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("Stealer thread panicked before shutdown");
            }
        }
        // jobs that raced in after the workers left
        let mut leftover = 0;
        while let Some(job) = self.shared.jobs.try_pop() {
            job.drain();
            leftover += 1;
        }
        if was_active || leftover > 0 {
            debug!("Stealer pool stopped, {} leftover jobs run inline", leftover);
        }
    }
}

impl Drop for StealerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cheap, cloneable access to a [`StealerPool`] for queue constructors.
#[derive(Clone)]
pub struct StealerHandle {
    shared: Arc<PoolShared>,
}

impl StealerHandle {
    /// Whether the pool still accepts hand-offs
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Whether any job is waiting for a stealer thread
    pub fn has_pending(&self) -> bool {
        self.shared.jobs.readable()
    }

    /// Queues `job` unless the pool is inactive or its job ring is full, in
    /// which case the job is handed back. Never blocks.
    pub fn try_submit(&self, job: Arc<dyn DrainJob>) -> Result<(), Arc<dyn DrainJob>> {
        if !self.is_active() {
            return Err(job);
        }
        self.shared.jobs.try_push(job)
    }

    /// Queues `job` for a stealer thread. Returns false if the pool was no
    /// longer active, in which case the job was not queued and the caller
    /// must run it itself.
    pub fn submit(&self, job: Arc<dyn DrainJob>) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.shared.jobs.try_push(job) {
            Ok(()) => true,
            Err(job) => {
                if self.is_active() {
                    self.shared.jobs.push(job);
                    true
                } else {
                    false
                }
            }
        }
    }
}
