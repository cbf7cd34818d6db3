use std::io;

use thiserror::Error;

/// Errors that can occur while starting the stealer pool
#[derive(Debug, Error)]
pub enum StealerPoolError {
    /// The OS refused to start one of the stealer threads
    #[error("Failed to spawn stealer thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}
