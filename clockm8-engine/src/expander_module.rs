//! Expander module - mirrors the lanes of the system module on its left and
//! feeds controller values back to it

use crate::expander::{ControlMessage, ExpanderLink, ModuleType, Neighbors, StatusMessage};
use crate::topology::MAX_LANES;
use clockm8_timing::{RatioLabel, CONTROL_RANGE};

const BANK_SIZE: usize = MAX_LANES / 2;

pub struct ExpanderModule {
    link: ExpanderLink,
    controller_values: [f32; MAX_LANES],
    bank_a: bool,
    bank_b: bool,
}

impl Default for ExpanderModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpanderModule {
    pub fn new() -> Self {
        Self {
            link: ExpanderLink::new(ModuleType::Expander),
            controller_values: [0.0; MAX_LANES],
            bank_a: false,
            bank_b: false,
        }
    }

    /// Advance one sample
    pub fn process(&mut self, neighbors: Neighbors<'_>) {
        self.link.update(&neighbors);

        if let Some(left) = neighbors.left {
            let control = self.outgoing_control();
            self.link.send_control(left, &control);
        }
        if let Some(right) = neighbors.right {
            self.link.send_status(right, None);
        }
    }

    /// Control from further right, with this module's active banks on top
    fn outgoing_control(&self) -> ControlMessage {
        let mut control = if self.link.right_active() {
            *self.link.control()
        } else {
            ControlMessage::default()
        };

        if self.bank_a {
            control.bank_a = true;
            control.controller_values[..BANK_SIZE]
                .copy_from_slice(&self.controller_values[..BANK_SIZE]);
        }
        if self.bank_b {
            control.bank_b = true;
            control.controller_values[BANK_SIZE..]
                .copy_from_slice(&self.controller_values[BANK_SIZE..]);
        }

        control
    }

    /// Set the controller for one lane (-10..10)
    pub fn set_controller(&mut self, lane: usize, value: f32) {
        if let Some(slot) = self.controller_values.get_mut(lane) {
            if value.is_finite() {
                *slot = value.clamp(-CONTROL_RANGE, CONTROL_RANGE);
            }
        }
    }

    /// Take over lanes 1-8 of the system module
    pub fn set_bank_a(&mut self, active: bool) {
        self.bank_a = active;
    }

    /// Take over lanes 9-16 of the system module
    pub fn set_bank_b(&mut self, active: bool) {
        self.bank_b = active;
    }

    /// Whether a system module's status reaches this expander
    pub fn is_attached(&self) -> bool {
        self.link.left_active() && self.status().module_type.is_system()
    }

    /// Latest status from the left
    pub fn status(&self) -> &StatusMessage {
        self.link.status()
    }

    /// Number of expanders between the system module and this one
    pub fn position(&self) -> usize {
        self.status().expander_count
    }

    pub fn lane_label(&self, lane: usize) -> RatioLabel {
        self.status().labels.get(lane).copied().unwrap_or_default()
    }

    pub fn lane_output(&self, lane: usize) -> f32 {
        self.status().outputs.get(lane).copied().unwrap_or(0.0)
    }

    pub fn link(&self) -> &ExpanderLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut ExpanderLink {
        &mut self.link
    }
}
