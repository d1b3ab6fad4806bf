//! Clock modulator - derives a multiplied/divided clock from a follower
//!
//! The modulator predicts the sample of its next pulse from the follower's
//! learned period and the selected ratio:
//! - On an input tick that falls exactly on a division boundary, the pulse
//!   snaps to the tick (phase alignment on the beat).
//! - Otherwise the next boundary inside the current tick-to-tick span is
//!   interpolated; when no boundary falls inside it, prediction waits for the
//!   next tick.
//!
//! All arithmetic is in whole samples. Fractional ratios are applied by a
//! floating point multiply followed by a floor, so derived pulses may land one
//! sample early or late relative to the ideal grid.

use crate::follower::ClockFollower;
use crate::primitives::PulseGenerator;
use crate::ratios::RatioLabel;
use serde::{Deserialize, Serialize};

/// Pulse length in trigger mode, in samples
pub const DEFAULT_TRIGGER_LENGTH: u64 = 10;
/// Output level while a pulse is active
pub const PULSE_HIGH: f32 = 10.0;
/// Output level between pulses
pub const PULSE_LOW: f32 = 0.0;

/// Division positions closer than this to a whole number count as whole
const PHASE_EPSILON: f32 = 1e-4;

/// Output pulse shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PulseMode {
    /// High for half of the derived interval (50% duty)
    #[default]
    Gate,
    /// Short fixed-length pulse
    Trigger,
}

/// Persisted modulator state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulatorState {
    pub is_running: bool,
    pub ratio: f32,
    pub ratio_label: RatioLabel,
    pub sample_counter: u64,
    pub next_pulse: Option<u64>,
    pub tick_counter: u64,
    pub last_clock_tick: u64,
    pub pulse_mode: PulseMode,
    pub follower: usize,
    pub pulse_remaining: u64,
}

/// One derived clock lane
#[derive(Debug, Clone, PartialEq)]
pub struct ClockModulator {
    ratio: f32,
    label: RatioLabel,
    /// Mirrors the bound follower's running flag as of the previous sample
    running: bool,
    /// Samples since the last reset
    sample_counter: u64,
    /// Input ticks since the last reset
    tick_counter: u64,
    last_tick: u64,
    next_pulse: Option<u64>,
    pulse_mode: PulseMode,
    trigger_length: u64,
    /// Index of the bound follower in the owner's follower array
    follower: usize,
    pulse: PulseGenerator,
}

impl Default for ClockModulator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ClockModulator {
    /// Create a unity modulator bound to the given follower index
    pub fn new(follower: usize) -> Self {
        Self {
            ratio: 1.0,
            label: RatioLabel::Unity,
            running: false,
            sample_counter: 0,
            tick_counter: 0,
            last_tick: 0,
            next_pulse: None,
            pulse_mode: PulseMode::Gate,
            trigger_length: DEFAULT_TRIGGER_LENGTH,
            follower,
            pulse: PulseGenerator::new(),
        }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn label(&self) -> RatioLabel {
        self.label
    }

    pub fn set_label(&mut self, label: RatioLabel) {
        self.label = label;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn sample_counter(&self) -> u64 {
        self.sample_counter
    }

    pub fn tick_counter(&self) -> u64 {
        self.tick_counter
    }

    /// Sample (relative to the last reset) of the next predicted pulse
    pub fn next_pulse(&self) -> Option<u64> {
        self.next_pulse
    }

    pub fn pulse_mode(&self) -> PulseMode {
        self.pulse_mode
    }

    /// Index of the bound follower
    pub fn follower(&self) -> usize {
        self.follower
    }

    pub fn set_trigger_length(&mut self, samples: u64) {
        self.trigger_length = samples.max(1);
    }

    /// Change the ratio. Returns true if it differs from the current one.
    ///
    /// A faster ratio cuts the pulse in flight so the first pulse of the new
    /// rate is not swallowed by a long gate of the old one.
    pub fn set_ratio(&mut self, ratio: f32, follower: &ClockFollower) -> bool {
        if !ratio.is_finite() || ratio <= 0.0 || ratio == self.ratio {
            return false;
        }

        if ratio > self.ratio {
            self.pulse.reset();
        }

        self.ratio = ratio;
        self.compute_next_pulse(follower);
        true
    }

    pub fn set_pulse_mode(&mut self, mode: PulseMode) {
        if self.pulse_mode == PulseMode::Gate && mode == PulseMode::Trigger {
            self.pulse.reset();
        }
        self.pulse_mode = mode;
    }

    /// Bind to a (possibly different) follower and re-predict
    ///
    /// A prediction made against another follower's timeline is dropped.
    pub fn bind(&mut self, index: usize, follower: &ClockFollower) {
        if index != self.follower {
            self.next_pulse = None;
        }
        self.follower = index;
        self.compute_next_pulse(follower);
    }

    /// Restart the derived clock: counters go back to zero and, when the
    /// period is already known, a pulse is emitted right away.
    pub fn reset(&mut self, follower: &ClockFollower) {
        self.sample_counter = 0;
        self.next_pulse = None;
        self.tick_counter = 0;
        self.running = true;

        if !follower.is_learning() {
            self.fire(follower);
        }
    }

    /// Handle an input tick from the bound follower
    pub fn tick(&mut self, follower: &ClockFollower) {
        if !self.running {
            self.reset(follower);
        }

        self.tick_counter += 1;
        self.last_tick = self.sample_counter;

        let tick_index = self.tick_counter - 1;
        if fraction(self.elapsed_divisions(tick_index)) == 0.0 {
            self.next_pulse = Some(self.sample_counter);
        } else {
            self.compute_next_pulse(follower);
        }
    }

    /// Drop all timing, as if freshly created. Ratio, label, pulse shape and
    /// binding are kept.
    pub fn clear(&mut self) {
        self.running = false;
        self.sample_counter = 0;
        self.tick_counter = 0;
        self.last_tick = 0;
        self.next_pulse = None;
        self.pulse.reset();
    }

    /// Advance one sample. The bound follower must already be stepped.
    #[inline]
    pub fn step(&mut self, follower: &ClockFollower) {
        self.sample_counter += 1;

        if follower.is_ticking() {
            self.tick(follower);
        }
        self.running = follower.is_running();

        if follower.is_running() && self.next_pulse == Some(self.sample_counter) {
            self.fire(follower);
            self.compute_next_pulse(follower);
        }
    }

    /// Output level for this sample; advances the pulse countdown, so call
    /// it exactly once per sample.
    #[inline]
    pub fn value(&mut self) -> f32 {
        if self.pulse.process() {
            PULSE_HIGH
        } else {
            PULSE_LOW
        }
    }

    /// Predict the next pulse inside the current tick-to-tick span
    pub fn compute_next_pulse(&mut self, follower: &ClockFollower) {
        let interval = self.interval(follower);
        if interval == 0 || self.ratio == 1.0 {
            // Unity passes ticks straight through; no period means no prediction
            return;
        }

        if self.tick_counter == 0 {
            // Nothing anchors the grid until the first tick after a reset
            self.next_pulse = None;
            return;
        }

        let remaining = self.remaining_division_ticks(self.tick_counter - 1);
        if remaining >= 1.0 {
            // No boundary inside this span, the next tick will realign
            self.next_pulse = None;
            return;
        }

        let offset = (remaining as f64 * follower.duration() as f64).floor() as u64;
        let first_pulse = self.last_tick + offset;

        self.next_pulse = Some(if self.sample_counter < first_pulse {
            first_pulse
        } else {
            let elapsed = (self.sample_counter - first_pulse) / interval;
            first_pulse + (elapsed + 1) * interval
        });
    }

    /// Derived interval in samples
    pub fn interval(&self, follower: &ClockFollower) -> u64 {
        (follower.duration() as f64 * self.division() as f64).floor() as u64
    }

    fn fire(&mut self, follower: &ClockFollower) {
        let length = match self.pulse_mode {
            PulseMode::Gate => self.interval(follower) / 2,
            PulseMode::Trigger => self.trigger_length,
        };
        self.pulse.trigger(length);
    }

    /// Length of one derived division, in input ticks
    #[inline]
    fn division(&self) -> f32 {
        1.0 / self.ratio
    }

    /// Number of derived divisions elapsed at the given input tick
    #[inline]
    fn elapsed_divisions(&self, tick_index: u64) -> f32 {
        tick_index as f32 / self.division()
    }

    /// Input ticks from the given tick to the next division boundary
    fn remaining_division_ticks(&self, tick_index: u64) -> f32 {
        let division = self.division();
        division - fraction(self.elapsed_divisions(tick_index)) * division
    }

    pub fn state(&self) -> ModulatorState {
        ModulatorState {
            is_running: self.running,
            ratio: self.ratio,
            ratio_label: self.label,
            sample_counter: self.sample_counter,
            next_pulse: self.next_pulse,
            tick_counter: self.tick_counter,
            last_clock_tick: self.last_tick,
            pulse_mode: self.pulse_mode,
            follower: self.follower,
            pulse_remaining: self.pulse.remaining(),
        }
    }

    pub fn restore(&mut self, state: &ModulatorState) {
        self.running = state.is_running;
        self.ratio = if state.ratio.is_finite() && state.ratio > 0.0 {
            state.ratio
        } else {
            1.0
        };
        self.label = state.ratio_label;
        self.sample_counter = state.sample_counter;
        self.next_pulse = state.next_pulse;
        self.tick_counter = state.tick_counter;
        self.last_tick = state.last_clock_tick;
        self.pulse_mode = state.pulse_mode;
        self.follower = state.follower;
        self.pulse.set_remaining(state.pulse_remaining);
    }
}

/// Fractional part, with values within `PHASE_EPSILON` of a whole number
/// snapped to zero
#[inline]
fn fraction(value: f32) -> f32 {
    let fract = value - value.trunc();
    if fract < PHASE_EPSILON || fract > 1.0 - PHASE_EPSILON {
        0.0
    } else {
        fract
    }
}
