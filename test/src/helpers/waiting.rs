use std::{
    thread,
    time::{Duration, Instant},
};

/// Upper bound for anything a test waits on
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] passes. Returns
/// whether it held.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
