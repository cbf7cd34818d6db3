mod server;
pub use server::Server;

mod server_config;
pub use server_config::ServerConfig;

mod server_handle;
pub(crate) use server_handle::ServerIo;
pub use server_handle::ServerHandle;

mod server_stats;
pub use server_stats::ServerStats;
pub(crate) use server_stats::StatCounters;
