//! Wall-clock seconds that follow Tokio's clock.
//!
//! Path entries carry absolute UNIX timestamps. Reading them through the
//! Tokio clock means a paused test runtime advances path expiry together
//! with every timer in the node.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
    origin_unix: u64,
}

impl Clock {
    pub fn new() -> Self {
        let origin_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::starting_at(origin_unix)
    }

    /// A clock that reads `unix` now.
    pub fn starting_at(unix: u64) -> Self {
        Self {
            origin: Instant::now(),
            origin_unix: unix,
        }
    }

    /// Current time in UNIX seconds.
    pub fn now(&self) -> u64 {
        self.origin_unix + self.origin.elapsed().as_secs()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
