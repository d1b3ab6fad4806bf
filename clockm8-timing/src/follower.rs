//! Clock follower - learns the period of an incoming clock lane
//!
//! The follower counts samples and measures the distance between the two most
//! recent ticks. A clock that stays silent for longer than the stop threshold
//! past its expected tick is considered stopped.

use serde::{Deserialize, Serialize};

/// Samples past the expected tick before a running clock is declared stopped
pub const DEFAULT_STOP_THRESHOLD: u64 = 1000;

/// Persisted follower state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FollowerState {
    pub is_running: bool,
    pub is_learning: bool,
    pub is_ticking: bool,
    pub sample_counter: u64,
    pub last_clock_tick: u64,
    pub duration: u64,
    pub next_expected_tick: u64,
    pub overdue_counter: u64,
}

/// Tracks one clock input lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockFollower {
    running: bool,
    /// True until two ticks have been seen
    learning: bool,
    /// True only during the sample a tick was observed
    ticking: bool,
    sample_counter: u64,
    last_tick: u64,
    /// Samples between the two most recent ticks (0 until known)
    duration: u64,
    next_expected_tick: u64,
    overdue: u64,
    stop_threshold: u64,
}

impl Default for ClockFollower {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockFollower {
    /// Create a follower in the never-ticked state
    pub fn new() -> Self {
        Self::with_stop_threshold(DEFAULT_STOP_THRESHOLD)
    }

    pub fn with_stop_threshold(stop_threshold: u64) -> Self {
        Self {
            running: false,
            learning: true,
            ticking: false,
            sample_counter: 0,
            last_tick: 0,
            duration: 0,
            next_expected_tick: 0,
            overdue: 0,
            stop_threshold,
        }
    }

    /// Forget everything learned; the stop threshold is kept
    pub fn reset(&mut self) {
        *self = Self::with_stop_threshold(self.stop_threshold);
    }

    /// Advance one sample. Must be called exactly once per sample, before `tick`.
    #[inline]
    pub fn step(&mut self) {
        self.ticking = false;
        self.sample_counter += 1;

        if self.running && self.sample_counter > self.next_expected_tick {
            self.overdue += 1;

            if self.overdue > self.stop_threshold && !self.learning {
                self.stop();
            }
        }
    }

    /// Register a rising edge on the clock input
    pub fn tick(&mut self) {
        // Two ticks on one sample can only come from a broken edge detector
        if self.running && self.sample_counter == self.last_tick {
            return;
        }

        self.ticking = true;

        if self.running {
            self.duration = self.sample_counter.saturating_sub(self.last_tick);
            self.learning = false;
            self.next_expected_tick = self.sample_counter + self.duration;
            self.overdue = 0;
        } else {
            self.running = true;
            if self.duration == 0 {
                // First tick ever, nothing to predict yet
                self.learning = true;
            } else {
                // Restart after a stop: assume the previous tempo
                self.next_expected_tick = self.sample_counter + self.duration;
                self.overdue = 0;
            }
        }

        self.last_tick = self.sample_counter;
    }

    fn stop(&mut self) {
        self.running = false;
        tracing::debug!(
            sample = self.sample_counter,
            duration = self.duration,
            "clock stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    /// Learned clock period in samples (0 while unknown)
    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn sample_counter(&self) -> u64 {
        self.sample_counter
    }

    pub fn last_tick_sample(&self) -> u64 {
        self.last_tick
    }

    pub fn next_expected_tick(&self) -> u64 {
        self.next_expected_tick
    }

    pub fn overdue_count(&self) -> u64 {
        self.overdue
    }

    pub fn stop_threshold(&self) -> u64 {
        self.stop_threshold
    }

    pub fn set_stop_threshold(&mut self, samples: u64) {
        self.stop_threshold = samples;
    }

    pub fn state(&self) -> FollowerState {
        FollowerState {
            is_running: self.running,
            is_learning: self.learning,
            is_ticking: self.ticking,
            sample_counter: self.sample_counter,
            last_clock_tick: self.last_tick,
            duration: self.duration,
            next_expected_tick: self.next_expected_tick,
            overdue_counter: self.overdue,
        }
    }

    pub fn restore(&mut self, state: &FollowerState) {
        self.running = state.is_running;
        self.learning = state.is_learning;
        self.ticking = state.is_ticking;
        self.sample_counter = state.sample_counter;
        self.last_tick = state.last_clock_tick;
        self.duration = state.duration;
        self.next_expected_tick = state.next_expected_tick;
        self.overdue = state.overdue_counter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Step `samples` times, ticking on the last step
    fn advance_and_tick(follower: &mut ClockFollower, samples: u64) {
        for _ in 0..samples {
            follower.step();
        }
        follower.tick();
    }

    #[test]
    fn test_first_tick_starts_learning() {
        let mut follower = ClockFollower::new();
        advance_and_tick(&mut follower, 1);

        assert!(follower.is_running());
        assert!(follower.is_learning());
        assert!(follower.is_ticking());
        assert_eq!(follower.duration(), 0);

        follower.step();
        assert!(!follower.is_ticking());
    }

    #[test]
    fn test_learns_constant_spacing() {
        let mut follower = ClockFollower::new();
        advance_and_tick(&mut follower, 1);

        for _ in 0..10 {
            advance_and_tick(&mut follower, 480);
            assert_eq!(follower.duration(), 480);
            assert!(!follower.is_learning());
            assert_eq!(
                follower.next_expected_tick(),
                follower.sample_counter() + 480
            );
        }
    }

    #[test]
    fn test_follows_tempo_change() {
        let mut follower = ClockFollower::new();
        advance_and_tick(&mut follower, 1);
        advance_and_tick(&mut follower, 1000);
        advance_and_tick(&mut follower, 750);
        assert_eq!(follower.duration(), 750);
    }

    #[test]
    fn test_stops_exactly_after_threshold() {
        let mut follower = ClockFollower::with_stop_threshold(100);
        advance_and_tick(&mut follower, 1);
        advance_and_tick(&mut follower, 200);
        let last_tick = follower.last_tick_sample();

        let mut stopped_at = None;
        for _ in 0..1000 {
            follower.step();
            if !follower.is_running() && stopped_at.is_none() {
                stopped_at = Some(follower.sample_counter());
            }
        }

        // Expected tick at last + 200, then 101 overdue samples
        assert_eq!(stopped_at, Some(last_tick + 200 + 101));
    }

    #[test]
    fn test_never_stops_while_learning() {
        let mut follower = ClockFollower::with_stop_threshold(10);
        advance_and_tick(&mut follower, 1);
        for _ in 0..10_000 {
            follower.step();
        }
        assert!(follower.is_running());
    }

    #[test]
    fn test_restart_reuses_learned_duration() {
        let mut follower = ClockFollower::with_stop_threshold(10);
        advance_and_tick(&mut follower, 1);
        advance_and_tick(&mut follower, 100);
        for _ in 0..500 {
            follower.step();
        }
        assert!(!follower.is_running());

        follower.tick();
        assert!(follower.is_running());
        assert!(!follower.is_learning());
        assert_eq!(follower.duration(), 100);
        assert_eq!(follower.overdue_count(), 0);
        assert_eq!(
            follower.next_expected_tick(),
            follower.sample_counter() + 100
        );
    }

    #[test]
    fn test_same_sample_tick_is_ignored() {
        let mut follower = ClockFollower::new();
        advance_and_tick(&mut follower, 1);
        advance_and_tick(&mut follower, 64);
        follower.tick();
        assert_eq!(follower.duration(), 64);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut follower = ClockFollower::new();
        advance_and_tick(&mut follower, 1);
        advance_and_tick(&mut follower, 300);
        for _ in 0..17 {
            follower.step();
        }

        let json = serde_json::to_string(&follower.state()).unwrap();
        let state: FollowerState = serde_json::from_str(&json).unwrap();
        let mut restored = ClockFollower::new();
        restored.restore(&state);

        assert_eq!(restored, follower);
    }

    #[test]
    fn test_reset_keeps_threshold() {
        let mut follower = ClockFollower::with_stop_threshold(42);
        advance_and_tick(&mut follower, 1);
        advance_and_tick(&mut follower, 10);
        follower.reset();
        assert_eq!(follower, ClockFollower::with_stop_threshold(42));
    }
}
