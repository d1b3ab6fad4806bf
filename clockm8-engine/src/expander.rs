//! Expander link - message passing between adjacent modules
//!
//! Each module owns two message slots, one per side:
//! - The left slot receives status and transport from the left neighbor
//! - The right slot receives control from the right neighbor
//!
//! A neighbor writes into the producer half of the slot and requests a flip.
//! The host flips every slot after all modules have processed a sample, so a
//! message travels exactly one module per sample.

use crate::topology::MAX_LANES;
use clockm8_timing::RatioLabel;

/// Module kinds taking part in the link protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleType {
    /// Not a compatible module; links to it stay inactive
    #[default]
    None,
    Expander,
    Clock,
}

impl ModuleType {
    /// Whether a link to this module type may be used
    pub fn is_linkable(self) -> bool {
        matches!(self, ModuleType::Expander | ModuleType::Clock)
    }

    /// System modules originate status; expanders only relay it
    pub fn is_system(self) -> bool {
        self == ModuleType::Clock
    }
}

/// Transport state carried left to right through the whole chain
///
/// No module here has a transport of its own; every module passes on what it
/// received from the left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransportMessage {
    pub phases: [f32; MAX_LANES],
    pub running: bool,
    pub start: bool,
    pub stop: bool,
    pub reset: bool,
}

/// Per-lane status carried left to right
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusMessage {
    /// Type of the system module the status originates from
    pub module_type: ModuleType,
    /// Number of expanders the status went through
    pub expander_count: usize,
    pub active_channels: usize,
    pub labels: [RatioLabel; MAX_LANES],
    pub values: [f32; MAX_LANES],
    pub outputs: [f32; MAX_LANES],
}

/// Controller values carried right to left until a system module is reached
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlMessage {
    /// Lanes 0-7 are controlled
    pub bank_a: bool,
    /// Lanes 8-15 are controlled
    pub bank_b: bool,
    pub controller_values: [f32; MAX_LANES],
}

impl ControlMessage {
    /// Controller value overriding the given lane, if its bank is active
    pub fn controller(&self, lane: usize) -> Option<f32> {
        let active = if lane < MAX_LANES / 2 {
            self.bank_a
        } else {
            self.bank_b
        };
        if active {
            self.controller_values.get(lane).copied()
        } else {
            None
        }
    }
}

/// Everything exchanged through one slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkMessage {
    pub status: StatusMessage,
    pub control: ControlMessage,
    pub transport: TransportMessage,
}

/// Single-producer single-consumer double buffer
#[derive(Debug, Clone, Default)]
pub struct MessageSlot<T> {
    buffers: [T; 2],
    consumer: usize,
    flip_requested: bool,
}

impl<T> MessageSlot<T> {
    /// Message visible to the owner
    pub fn consumer(&self) -> &T {
        &self.buffers[self.consumer]
    }

    /// Buffer the neighbor writes into
    pub fn producer_mut(&mut self) -> &mut T {
        &mut self.buffers[self.consumer ^ 1]
    }

    pub fn request_flip(&mut self) {
        self.flip_requested = true;
    }

    pub fn flip_requested(&self) -> bool {
        self.flip_requested
    }

    /// Swap producer and consumer if a flip was requested
    pub fn flip(&mut self) -> bool {
        if !self.flip_requested {
            return false;
        }
        self.consumer ^= 1;
        self.flip_requested = false;
        true
    }
}

/// Per-lane data a system module publishes to its right
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LaneReport {
    pub active_channels: usize,
    pub labels: [RatioLabel; MAX_LANES],
    pub values: [f32; MAX_LANES],
    pub outputs: [f32; MAX_LANES],
}

/// A module's side of the link protocol
#[derive(Debug, Clone, Default)]
pub struct ExpanderLink {
    module_type: ModuleType,
    left: MessageSlot<LinkMessage>,
    right: MessageSlot<LinkMessage>,
    left_type: ModuleType,
    right_type: ModuleType,
}

/// Mutable access to the links of the modules adjacent to the one processing
#[derive(Debug, Default)]
pub struct Neighbors<'a> {
    pub left: Option<&'a mut ExpanderLink>,
    pub right: Option<&'a mut ExpanderLink>,
}

impl<'a> Neighbors<'a> {
    /// A module with nothing next to it
    pub fn none() -> Self {
        Self::default()
    }
}

impl ExpanderLink {
    pub fn new(module_type: ModuleType) -> Self {
        Self {
            module_type,
            ..Self::default()
        }
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    /// Refresh neighbor types; incompatible or absent neighbors read as `None`
    pub fn update(&mut self, neighbors: &Neighbors<'_>) {
        let linkable = |link: &Option<&mut ExpanderLink>| {
            link.as_ref()
                .map(|l| l.module_type)
                .filter(|t| t.is_linkable())
                .unwrap_or(ModuleType::None)
        };
        self.left_type = linkable(&neighbors.left);
        self.right_type = linkable(&neighbors.right);
    }

    pub fn left_active(&self) -> bool {
        self.left_type != ModuleType::None
    }

    pub fn right_active(&self) -> bool {
        self.right_type != ModuleType::None
    }

    pub fn left_type(&self) -> ModuleType {
        self.left_type
    }

    pub fn right_type(&self) -> ModuleType {
        self.right_type
    }

    /// Status received from the left
    pub fn status(&self) -> &StatusMessage {
        &self.left.consumer().status
    }

    /// Transport received from the left
    pub fn transport(&self) -> &TransportMessage {
        &self.left.consumer().transport
    }

    /// Control received from the right
    pub fn control(&self) -> &ControlMessage {
        &self.right.consumer().control
    }

    /// Pass status and transport to the right neighbor
    ///
    /// System modules stamp their own type and lanes over the status; other
    /// modules relay what they received and count themselves.
    pub fn send_status(&self, right: &mut ExpanderLink, report: Option<&LaneReport>) {
        if !self.right_active() {
            return;
        }

        let slot = &mut right.left;
        let message = slot.producer_mut();
        message.status = *self.status();
        message.transport = *self.transport();

        match report {
            Some(report) if self.module_type.is_system() => {
                message.status.module_type = self.module_type;
                message.status.active_channels = report.active_channels;
                message.status.labels = report.labels;
                message.status.values = report.values;
                message.status.outputs = report.outputs;
            }
            _ => message.status.expander_count += 1,
        }

        slot.request_flip();
    }

    /// Pass a control message to the left neighbor
    pub fn send_control(&self, left: &mut ExpanderLink, control: &ControlMessage) {
        if !self.left_active() {
            return;
        }

        let slot = &mut left.right;
        slot.producer_mut().control = *control;
        slot.request_flip();
    }

    /// Host side: complete the exchange for both slots
    pub fn flip(&mut self) {
        self.left.flip();
        self.right.flip();
    }
}
