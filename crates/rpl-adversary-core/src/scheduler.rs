//! Jittered Scheduler
//!
//! Owns the wake-up cadence of the transmission cycle and the independent
//! sub-cadence of the DIS flood. Both are plain countdown deadlines over a
//! [`Timestamp`]; whoever drives the node asks `expired(now)` and sleeps until
//! `deadline()` in between.

use core::time::Duration;

use crate::config::{DropRearm, ScheduleConfig};
use crate::random::RandomSource;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Cycle Timer
// ----------------------------------------------------------------------------

/// Cycle timer with uniform jitter
///
/// Every regular interval is `base - unit + U[0, 2*unit)`, so consecutive
/// nodes started together drift apart instead of transmitting in lockstep.
pub struct JitteredScheduler {
    base: Duration,
    jitter_unit: Duration,
    drop_rearm: DropRearm,
    deadline: Timestamp,
    last_interval: Duration,
    random: Box<dyn RandomSource>,
}

impl JitteredScheduler {
    pub fn new(config: &ScheduleConfig, random: Box<dyn RandomSource>) -> Self {
        Self {
            base: config.base_interval(),
            jitter_unit: config.jitter_unit(),
            drop_rearm: config.drop_rearm,
            deadline: Timestamp::ZERO,
            last_interval: Duration::ZERO,
            random,
        }
    }

    /// Arm the first wake-up at a uniformly random offset in `[0, base)`
    pub fn start(&mut self, now: Timestamp) -> Timestamp {
        let offset = self.random.gen_range_u64(0, millis(self.base));
        self.arm(now, Duration::from_millis(offset));
        self.deadline
    }

    /// Arm the next regular cycle; call once after every cycle
    pub fn schedule_next(&mut self, now: Timestamp) -> Duration {
        let unit = millis(self.jitter_unit);
        let jitter = self.random.gen_range_u64(0, unit.saturating_mul(2));
        let interval = millis(self.base).saturating_sub(unit).saturating_add(jitter);
        self.arm(now, Duration::from_millis(interval));
        self.last_interval
    }

    /// Arm the cycle that follows a selectively dropped packet
    pub fn schedule_after_drop(&mut self, now: Timestamp) -> Duration {
        match self.drop_rearm {
            DropRearm::Short { interval_ms } => {
                self.arm(now, Duration::from_millis(interval_ms));
                self.last_interval
            }
            DropRearm::RepeatPrevious => {
                // never re-arm with a zero interval
                let interval = self.last_interval.max(self.jitter_unit);
                self.deadline = self.deadline + interval;
                self.last_interval = interval;
                interval
            }
            DropRearm::Jittered => self.schedule_next(now),
        }
    }

    /// Whether the current deadline has passed
    pub fn expired(&self, now: Timestamp) -> bool {
        now >= self.deadline
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    /// Time left until the deadline, zero once expired
    pub fn time_until(&self, now: Timestamp) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    /// Interval used by the most recent arm
    pub fn last_interval(&self) -> Duration {
        self.last_interval
    }

    fn arm(&mut self, now: Timestamp, interval: Duration) {
        self.deadline = now + interval;
        self.last_interval = interval;
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ----------------------------------------------------------------------------
// Flood Timer
// ----------------------------------------------------------------------------

/// Fixed-interval timer gating DIS solicitations
///
/// A timer that was never armed counts as expired, so the first flood step
/// fires and arms it in the same call.
#[derive(Debug, Clone)]
pub struct FloodTimer {
    interval: Duration,
    deadline: Option<Timestamp>,
}

impl FloodTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn expired(&self, now: Timestamp) -> bool {
        self.deadline.map_or(true, |deadline| now >= deadline)
    }

    /// Arm for one full interval from `now`
    pub fn rearm(&mut self, now: Timestamp) {
        self.deadline = Some(now + self.interval);
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;

    fn scheduler(drop_rearm: DropRearm) -> JitteredScheduler {
        let config = ScheduleConfig {
            drop_rearm,
            ..ScheduleConfig::default()
        };
        JitteredScheduler::new(&config, Box::new(SeededRandom::new(7)))
    }

    #[test]
    fn test_start_offset_within_base_interval() {
        let mut sched = scheduler(DropRearm::default());
        let deadline = sched.start(Timestamp::new(500));
        assert!(deadline >= Timestamp::new(500));
        assert!(deadline < Timestamp::new(500 + 10_000));
    }

    #[test]
    fn test_jittered_interval_bounds() {
        let mut sched = scheduler(DropRearm::default());
        let mut now = Timestamp::ZERO;
        for _ in 0..500 {
            let interval = sched.schedule_next(now);
            assert!(interval >= Duration::from_millis(9_000));
            assert!(interval < Duration::from_millis(11_000));
            assert_eq!(sched.deadline(), now + interval);
            now = sched.deadline();
        }
    }

    #[test]
    fn test_expired_and_time_until() {
        let mut sched = scheduler(DropRearm::default());
        let interval = sched.schedule_next(Timestamp::ZERO);
        let deadline = sched.deadline();

        assert!(!sched.expired(Timestamp::ZERO));
        assert_eq!(sched.time_until(Timestamp::ZERO), interval);
        assert!(sched.expired(deadline));
        assert_eq!(sched.time_until(deadline + Duration::from_millis(5)), Duration::ZERO);
    }

    #[test]
    fn test_short_drop_rearm() {
        let mut sched = scheduler(DropRearm::Short { interval_ms: 1_000 });
        sched.schedule_next(Timestamp::ZERO);
        let now = sched.deadline();
        let interval = sched.schedule_after_drop(now);
        assert_eq!(interval, Duration::from_millis(1_000));
        assert_eq!(sched.deadline(), now + Duration::from_millis(1_000));
    }

    #[test]
    fn test_repeat_previous_drop_rearm() {
        let mut sched = scheduler(DropRearm::RepeatPrevious);
        let first = sched.schedule_next(Timestamp::ZERO);
        let expiry = sched.deadline();

        // handled a little late; the re-arm is still anchored at the old deadline
        let interval = sched.schedule_after_drop(expiry + Duration::from_millis(3));
        assert_eq!(interval, first);
        assert_eq!(sched.deadline(), expiry + first);
    }

    #[test]
    fn test_repeat_previous_never_zero() {
        let mut sched = scheduler(DropRearm::RepeatPrevious);
        // no interval armed yet
        let interval = sched.schedule_after_drop(Timestamp::ZERO);
        assert_eq!(interval, Duration::from_millis(1_000));
    }

    #[test]
    fn test_jittered_drop_rearm_matches_regular_cadence() {
        let mut sched = scheduler(DropRearm::Jittered);
        let interval = sched.schedule_after_drop(Timestamp::ZERO);
        assert!(interval >= Duration::from_millis(9_000));
        assert!(interval < Duration::from_millis(11_000));
    }

    #[test]
    fn test_flood_timer_unarmed_counts_as_expired() {
        let mut timer = FloodTimer::new(Duration::from_secs(5));
        assert!(!timer.is_armed());
        assert!(timer.expired(Timestamp::ZERO));

        timer.rearm(Timestamp::new(1_000));
        assert!(timer.is_armed());
        assert!(!timer.expired(Timestamp::new(5_999)));
        assert!(timer.expired(Timestamp::new(6_000)));
        assert_eq!(timer.deadline(), Some(Timestamp::new(6_000)));
    }
}
