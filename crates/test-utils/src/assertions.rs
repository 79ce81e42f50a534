//! Test assertion helpers.

use std::time::{Duration, Instant};

/// Default polling interval for [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls a condition until it returns true or the timeout expires.
///
/// Used by tests that coordinate with pipeline threads, where the exact
/// timing is non-deterministic.
///
/// # Returns
///
/// `true` if the condition became true before timeout, `false` otherwise.
pub fn assert_eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(DEFAULT_POLL_INTERVAL);
    }
}
