mod error;
mod stealer_pool;
mod work_stealing;

pub use error::StealerPoolError;
pub use stealer_pool::{
    DrainJob, StealerConfig, StealerHandle, StealerPool, DEFAULT_STEAL_THREADS,
};
pub use work_stealing::{WorkStealing, WorkStealingQueue};
