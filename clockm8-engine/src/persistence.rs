//! Module state persistence
//!
//! Saves the full numeric state of every follower and modulator so a
//! reloaded module continues with identical timing.

use crate::module::{ClockModule, ModuleParams};
use crate::topology::MAX_LANES;
use clockm8_timing::{FollowerState, ModulatorState, PulseMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected {expected} {what}, found {found}")]
    LaneCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Serialized form of a clock module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub output_mode: PulseMode,
    pub clock_followers: Vec<FollowerState>,
    pub clock_modulators: Vec<ModulatorState>,
    #[serde(default)]
    pub params: ModuleParams,
    /// Latched level of each clock input edge detector
    #[serde(default)]
    pub clock_triggers: Vec<bool>,
    /// Latched level of each reset input edge detector
    #[serde(default)]
    pub reset_triggers: Vec<bool>,
}

impl ClockModule {
    pub fn state(&self) -> ModuleState {
        ModuleState {
            output_mode: self.output_mode(),
            clock_followers: self.followers().iter().map(|f| f.state()).collect(),
            clock_modulators: self.modulators().iter().map(|m| m.state()).collect(),
            params: self.params(),
            clock_triggers: self.triggers().0.iter().map(|t| t.is_high()).collect(),
            reset_triggers: self.triggers().1.iter().map(|t| t.is_high()).collect(),
        }
    }

    /// Restore a saved state. Nothing is changed if the state is rejected.
    ///
    /// States saved without trigger levels leave the edge detectors as they
    /// are.
    pub fn restore(&mut self, state: &ModuleState) -> Result<(), PersistError> {
        check_lanes("followers", state.clock_followers.len())?;
        check_lanes("modulators", state.clock_modulators.len())?;
        check_triggers("clock triggers", &state.clock_triggers)?;
        check_triggers("reset triggers", &state.reset_triggers)?;

        self.set_output_mode(state.output_mode);
        self.set_params(state.params);

        let (followers, modulators) = self.lanes_mut();
        for (follower, saved) in followers.iter_mut().zip(&state.clock_followers) {
            follower.restore(saved);
        }
        for (modulator, saved) in modulators.iter_mut().zip(&state.clock_modulators) {
            let mut saved = *saved;
            saved.follower = saved.follower.min(MAX_LANES - 1);
            modulator.restore(&saved);
        }

        let (clock_triggers, reset_triggers) = self.triggers_mut();
        for (trigger, &high) in clock_triggers.iter_mut().zip(&state.clock_triggers) {
            trigger.set_high(high);
        }
        for (trigger, &high) in reset_triggers.iter_mut().zip(&state.reset_triggers) {
            trigger.set_high(high);
        }

        tracing::debug!(mode = ?state.output_mode, "module state restored");
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(&self.state())?)
    }

    pub fn from_json(&mut self, json: &str) -> Result<(), PersistError> {
        let state: ModuleState = serde_json::from_str(json)?;
        self.restore(&state)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from(&mut self, path: &Path) -> Result<(), PersistError> {
        let json = fs::read_to_string(path)?;
        self.from_json(&json)
    }
}

fn check_lanes(what: &'static str, found: usize) -> Result<(), PersistError> {
    if found == MAX_LANES {
        Ok(())
    } else {
        Err(PersistError::LaneCount {
            what,
            expected: MAX_LANES,
            found,
        })
    }
}

fn check_triggers(what: &'static str, levels: &[bool]) -> Result<(), PersistError> {
    if levels.is_empty() {
        Ok(())
    } else {
        check_lanes(what, levels.len())
    }
}
