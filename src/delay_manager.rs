use std::thread;
use std::time::Duration;

use log::debug;

/// Fixed wait for the page to catch up when it gives no completion signal.
pub fn settle(delay: Duration, what: &str) {
    if delay.is_zero() {
        return;
    }
    debug!("Waiting for {} ms ({})...", delay.as_millis(), what);
    thread::sleep(delay);
}

/// Sleep between polls. Kept separate from `settle` so poll loops stay quiet in the log.
pub fn poll_interval(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
