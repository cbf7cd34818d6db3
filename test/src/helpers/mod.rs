pub mod waiting;

pub use test_client::{connect_client, fast_client_config};
pub use test_server::TestServer;
pub use waiting::{init_logger, wait_until, WAIT_TIMEOUT};
