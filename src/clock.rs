use std::time::{Instant, SystemTime};

use crate::ntp;

/// Clock is the session's time source. The transmission algorithm only
/// needs monotonic milliseconds; the NTP reading feeds sender reports.
pub trait Clock: Send + Sync {
    /// Monotonic wall-clock time in milliseconds.
    fn current_time(&self) -> u64;

    /// The current instant as a 64-bit NTP timestamp.
    fn ntp_time(&self) -> u64 {
        ntp::ntp_time(SystemTime::now())
    }
}

/// SystemClock reads monotonic time from the host, anchored at its own
/// construction.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn current_time(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
