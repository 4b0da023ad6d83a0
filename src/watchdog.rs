// Command watchdog
// Note: if the command source dies (teleop crash, network drop) the last command would
// otherwise keep driving the robot. The watchdog forces a stop once commands go silent.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Outcome of polling the watchdog on a loop tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// A command arrived within the timeout
    Fresh,
    /// Commands just went stale on this tick
    Tripped,
    /// Still stale since an earlier tick
    Stale,
}

impl WatchdogEvent {
    /// Whether the motors must be stopped on this tick
    pub fn requires_stop(self) -> bool {
        !matches!(self, WatchdogEvent::Fresh)
    }
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    last_command_time: Instant,
    timed_out: bool,
}

/// Watchdog shared between the command path and the control loop
pub type SharedWatchdog = Arc<Mutex<Watchdog>>;

impl Watchdog {
    /// The timeout window starts at `now`, before any command has been seen
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_command_time: now,
            timed_out: false,
        }
    }

    pub fn shared(self) -> SharedWatchdog {
        Arc::new(Mutex::new(self))
    }

    /// Record an accepted command
    pub fn record(&mut self, now: Instant) {
        self.last_command_time = now;
        self.timed_out = false;
    }

    /// True when more than the timeout has elapsed since the last command
    pub fn check(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_command_time) > self.timeout
    }

    /// Check and latch the timeout state, reporting the transition once
    pub fn poll(&mut self, now: Instant) -> WatchdogEvent {
        if !self.check(now) {
            return WatchdogEvent::Fresh;
        }
        if self.timed_out {
            WatchdogEvent::Stale
        } else {
            self.timed_out = true;
            WatchdogEvent::Tripped
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn last_command_time(&self) -> Instant {
        self.last_command_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_fresh_after_record() {
        let t0 = Instant::now();
        let mut wd = Watchdog::new(TIMEOUT, t0);
        let later = t0 + Duration::from_secs(10);
        assert!(wd.check(later));

        wd.record(later);
        assert!(!wd.check(later));
        assert_eq!(wd.last_command_time(), later);
    }

    #[test]
    fn test_boundary_is_not_timed_out() {
        let t0 = Instant::now();
        let wd = Watchdog::new(TIMEOUT, t0);
        assert!(!wd.check(t0 + TIMEOUT));
        assert!(wd.check(t0 + TIMEOUT + Duration::from_millis(1)));
    }

    #[test]
    fn test_poll_trips_once() {
        let t0 = Instant::now();
        let mut wd = Watchdog::new(TIMEOUT, t0);

        assert_eq!(wd.poll(t0 + Duration::from_secs(1)), WatchdogEvent::Fresh);
        assert_eq!(wd.poll(t0 + Duration::from_secs(3)), WatchdogEvent::Tripped);
        assert_eq!(wd.poll(t0 + Duration::from_secs(4)), WatchdogEvent::Stale);
        assert_eq!(wd.poll(t0 + Duration::from_secs(5)), WatchdogEvent::Stale);
        assert!(wd.is_timed_out());
    }

    #[test]
    fn test_record_rearms_notification() {
        let t0 = Instant::now();
        let mut wd = Watchdog::new(TIMEOUT, t0);
        assert_eq!(wd.poll(t0 + Duration::from_secs(3)), WatchdogEvent::Tripped);

        wd.record(t0 + Duration::from_secs(4));
        assert!(!wd.is_timed_out());
        assert_eq!(wd.poll(t0 + Duration::from_secs(5)), WatchdogEvent::Fresh);
        assert_eq!(wd.poll(t0 + Duration::from_secs(7)), WatchdogEvent::Tripped);
    }

    #[test]
    fn test_every_stale_tick_requires_stop() {
        assert!(WatchdogEvent::Tripped.requires_stop());
        assert!(WatchdogEvent::Stale.requires_stop());
        assert!(!WatchdogEvent::Fresh.requires_stop());
    }
}
