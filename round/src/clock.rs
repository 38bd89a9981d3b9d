use std::time::Duration;

/// Monotonic round time derived from host timestamps.
///
/// Round time only moves while running; pausing freezes it and stopping
/// freezes it for good. Host timestamps that go backwards are ignored.
#[derive(Clone, Debug, Default)]
pub struct RoundClock {
    anchor: Duration,
    elapsed: Duration,
    state: ClockState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ClockState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl RoundClock {
    /// Creates a clock that has not started yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts round time at zero. Returns `false` if the clock already started.
    pub fn start(&mut self, host_time: Duration) -> bool {
        if self.state != ClockState::Idle {
            return false;
        }
        self.anchor = host_time;
        self.elapsed = Duration::ZERO;
        self.state = ClockState::Running;
        true
    }

    /// Advances round time to the provided host instant and returns it.
    pub fn advance(&mut self, host_time: Duration) -> u64 {
        if self.state == ClockState::Running && host_time > self.anchor {
            self.elapsed = self.elapsed.saturating_add(host_time - self.anchor);
            self.anchor = host_time;
        }
        self.now_ms()
    }

    /// Freezes round time. Returns `false` unless the clock was running.
    pub fn pause(&mut self, host_time: Duration) -> bool {
        if self.state != ClockState::Running {
            return false;
        }
        let _ = self.advance(host_time);
        self.state = ClockState::Paused;
        true
    }

    /// Unfreezes round time. Returns `false` unless the clock was paused.
    pub fn resume(&mut self, host_time: Duration) -> bool {
        if self.state != ClockState::Paused {
            return false;
        }
        self.anchor = host_time;
        self.state = ClockState::Running;
        true
    }

    /// Freezes round time permanently.
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    /// Milliseconds of round time elapsed.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn time_is_relative_to_start() {
        let mut clock = RoundClock::new();
        assert_eq!(clock.advance(ms(500)), 0);
        assert!(clock.start(ms(1_000)));
        assert!(!clock.start(ms(2_000)));
        assert_eq!(clock.advance(ms(3_250)), 2_250);
    }

    #[test]
    fn pause_excludes_frozen_interval() {
        let mut clock = RoundClock::new();
        let _ = clock.start(ms(0));
        assert!(clock.pause(ms(1_000)));
        assert_eq!(clock.advance(ms(5_000)), 1_000);
        assert!(clock.resume(ms(6_000)));
        assert_eq!(clock.advance(ms(6_500)), 1_500);
    }

    #[test]
    fn host_time_going_backwards_is_ignored() {
        let mut clock = RoundClock::new();
        let _ = clock.start(ms(1_000));
        assert_eq!(clock.advance(ms(2_000)), 1_000);
        assert_eq!(clock.advance(ms(1_500)), 1_000);
        assert_eq!(clock.advance(ms(2_100)), 1_100);
    }

    #[test]
    fn stopped_clock_is_frozen() {
        let mut clock = RoundClock::new();
        let _ = clock.start(ms(0));
        let _ = clock.advance(ms(700));
        clock.stop();
        assert_eq!(clock.advance(ms(9_000)), 700);
        assert!(!clock.resume(ms(9_500)));
        assert!(!clock.pause(ms(9_600)));
    }

    #[test]
    fn sub_millisecond_steps_accumulate() {
        let mut clock = RoundClock::new();
        let _ = clock.start(Duration::ZERO);
        for step in 1..=4 {
            let _ = clock.advance(Duration::from_micros(step * 400));
        }
        assert_eq!(clock.now_ms(), 1);
    }
}
