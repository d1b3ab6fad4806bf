//! Sample-counting building blocks: pulse generator, Schmitt trigger, clock divider

use serde::{Deserialize, Serialize};

/// Emits a high level for a fixed number of samples after being triggered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseGenerator {
    remaining: u64,
}

impl PulseGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pulse. A longer pulse already in flight is not shortened.
    pub fn trigger(&mut self, duration: u64) {
        if duration > self.remaining {
            self.remaining = duration;
        }
    }

    /// Cut the current pulse
    pub fn reset(&mut self) {
        self.remaining = 0;
    }

    /// Advance one sample, returning whether the output is high
    #[inline]
    pub fn process(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Samples left in the current pulse
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Restore a pulse in flight
    pub fn set_remaining(&mut self, remaining: u64) {
        self.remaining = remaining;
    }
}

/// Default voltage at or above which a trigger input reads high
pub const DEFAULT_TRIGGER_HIGH: f32 = 2.0;
/// Default voltage at or below which a trigger input reads low
pub const DEFAULT_TRIGGER_LOW: f32 = 0.1;

/// Rising-edge detector with hysteresis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchmittTrigger {
    low: f32,
    high: f32,
    state: bool,
}

impl Default for SchmittTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_LOW, DEFAULT_TRIGGER_HIGH)
    }
}

impl SchmittTrigger {
    pub fn new(low: f32, high: f32) -> Self {
        Self {
            low: low.min(high),
            high: high.max(low),
            state: false,
        }
    }

    /// Feed one sample. Returns true only on the low→high transition.
    #[inline]
    pub fn process(&mut self, voltage: f32) -> bool {
        if self.state {
            if voltage <= self.low {
                self.state = false;
            }
            false
        } else if voltage >= self.high {
            self.state = true;
            true
        } else {
            false
        }
    }

    pub fn is_high(&self) -> bool {
        self.state
    }

    /// Force the latched level, e.g. when restoring a saved module
    pub fn set_high(&mut self, high: bool) {
        self.state = high;
    }

    pub fn reset(&mut self) {
        self.state = false;
    }
}

/// Fires once every `division` calls; used for reduced-rate housekeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDivider {
    clock: u32,
    division: u32,
}

impl ClockDivider {
    pub fn new(division: u32) -> Self {
        Self {
            clock: 0,
            division: division.max(1),
        }
    }

    pub fn set_division(&mut self, division: u32) {
        self.division = division.max(1);
        self.clock = 0;
    }

    pub fn division(&self) -> u32 {
        self.division
    }

    /// Make the next `process` call fire
    pub fn prime(&mut self) {
        self.clock = self.division - 1;
    }

    #[inline]
    pub fn process(&mut self) -> bool {
        self.clock += 1;
        if self.clock >= self.division {
            self.clock = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_length() {
        let mut pulse = PulseGenerator::new();
        pulse.trigger(3);
        let levels: Vec<bool> = (0..5).map(|_| pulse.process()).collect();
        assert_eq!(levels, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_pulse_retrigger_keeps_longest() {
        let mut pulse = PulseGenerator::new();
        pulse.trigger(10);
        pulse.process();
        pulse.trigger(2);
        assert_eq!(pulse.remaining(), 9);
        pulse.trigger(20);
        assert_eq!(pulse.remaining(), 20);
    }

    #[test]
    fn test_schmitt_hysteresis() {
        let mut trigger = SchmittTrigger::default();
        assert!(!trigger.process(1.0));
        assert!(trigger.process(5.0));
        assert!(!trigger.process(5.0));
        // Dipping into the dead band does not re-arm
        assert!(!trigger.process(1.0));
        assert!(!trigger.process(5.0));
        assert!(!trigger.process(0.0));
        assert!(trigger.process(2.0));
    }

    #[test]
    fn test_schmitt_latched_high_needs_low_first() {
        let mut trigger = SchmittTrigger::default();
        trigger.set_high(true);
        assert!(!trigger.process(10.0));
        assert!(!trigger.process(0.0));
        assert!(trigger.process(10.0));

        trigger.reset();
        assert!(!trigger.is_high());
    }

    #[test]
    fn test_clock_divider() {
        let mut divider = ClockDivider::new(4);
        let fired: Vec<bool> = (0..8).map(|_| divider.process()).collect();
        assert_eq!(
            fired,
            vec![false, false, false, true, false, false, false, true]
        );

        divider.prime();
        assert!(divider.process());
        assert!(!divider.process());
    }
}
