//! Virtual clock for deterministic simulation
//!
//! Time only moves when the executor says so. Clones share the same
//! underlying time, so collaborators handed a clone observe every jump.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rpl_adversary_core::{TimeSource, Timestamp};

/// Manually advanced clock in milliseconds
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    current_time: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manually advance virtual time by the given duration
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to `time`; never moves backwards
    pub fn set_time(&self, time: Timestamp) {
        self.current_time
            .fetch_max(time.as_millis(), Ordering::SeqCst);
    }

    /// Elapsed virtual time since zero
    pub fn current_time(&self) -> Duration {
        Duration::from_millis(self.current_time.load(Ordering::SeqCst))
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}
