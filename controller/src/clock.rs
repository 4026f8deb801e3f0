// Host tick source

use std::time::Instant;

use tacho_governor::Clock;

/// Microseconds since bench start, truncated to a wrapping 32-bit counter
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    start: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn now_us(&self) -> u32 {
        // wraps after ~71 minutes
        self.start.elapsed().as_micros() as u32
    }
}
