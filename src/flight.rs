use std::sync::atomic::{AtomicBool, Ordering};

/// Lets at most one caller hold the flight at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    held: AtomicBool,
}

/// Releases the flight when dropped.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    held: &'a AtomicBool,
}

impl SingleFlight {
    pub const fn new() -> Self {
        SingleFlight {
            held: AtomicBool::new(false),
        }
    }

    /// `None` when someone else already holds the flight.
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { held: &self.held })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
