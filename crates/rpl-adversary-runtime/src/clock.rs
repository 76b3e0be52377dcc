//! Time abstraction for the runtime loop
//!
//! The loop only needs "what time is it" and "wake me after this long".
//! [`SystemClock`] answers both from `tokio::time`, so a runtime started
//! under paused tokio time runs entirely in virtual time.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rpl_adversary_core::{TimeSource, Timestamp};
use tokio::time::{sleep, Instant};

/// Abstraction for time operations in the runtime
pub trait SimulationClock: Send + Sync {
    /// Milliseconds since the clock's origin
    fn now(&self) -> Timestamp;

    /// Sleep for a duration
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
}

/// Clock over `tokio::time`, with its origin at construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationClock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_millis();
        Timestamp::new(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        Box::pin(async move {
            sleep(duration).await;
        })
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        SimulationClock::now(self)
    }
}
