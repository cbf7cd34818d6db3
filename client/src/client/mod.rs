mod backoff;
pub use backoff::ReconnectBackoff;

mod client;
pub use client::Client;

mod client_config;
pub use client_config::ClientConfig;

mod client_state;
pub use client_state::ClientState;

mod client_stats;
pub use client_stats::ClientStats;
pub(crate) use client_stats::StatCounters;
