//! Clock timing for clockm8 - sample-accurate clock following and derivation
//!
//! This crate provides the per-lane timing primitives:
//! - ClockFollower: learns the period of an incoming clock and detects stops
//! - ClockModulator: derives a multiplied/divided clock from a follower
//! - RatioCatalog: quantized ratio tables and control-value resolution
//! - Primitives: pulse generator, Schmitt trigger, clock divider

mod follower;
mod modulator;
mod primitives;
mod ratios;

pub use follower::{ClockFollower, FollowerState, DEFAULT_STOP_THRESHOLD};
pub use modulator::{
    ClockModulator, ModulatorState, PulseMode, DEFAULT_TRIGGER_LENGTH, PULSE_HIGH, PULSE_LOW,
};
pub use primitives::{
    ClockDivider, PulseGenerator, SchmittTrigger, DEFAULT_TRIGGER_HIGH, DEFAULT_TRIGGER_LOW,
};
pub use ratios::{RatioCatalog, RatioCategories, RatioLabel, CONTROL_RANGE};
