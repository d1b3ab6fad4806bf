//! Clock module - polyphonic clock follower and multiplier/divider
//!
//! One module follows up to 16 clock lanes and derives up to 16 output lanes.
//! Each sample runs in a fixed order:
//! - Link refresh and housekeeping (connections, lane counts, ratio catalog)
//! - Reset edges and ratio selection per output lane
//! - Followers step and register clock edges
//! - Modulators step and write the outputs
//! - Status relay to the right neighbor

use crate::config::EngineConfig;
use crate::expander::{ExpanderLink, LaneReport, ModuleType, Neighbors};
use crate::topology::{Topology, TopologyReconciler, MAX_LANES};
use clockm8_timing::{
    ClockDivider, ClockFollower, ClockModulator, PulseMode, RatioCatalog, RatioCategories,
    RatioLabel, SchmittTrigger, CONTROL_RANGE, PULSE_LOW,
};
use serde::{Deserialize, Serialize};

/// Polyphonic input port as seen by the module
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortInput {
    pub connected: bool,
    pub channels: usize,
    pub voltages: [f32; MAX_LANES],
}

impl PortInput {
    /// A connected port carrying `channels` lanes at 0 V
    pub fn connected(channels: usize) -> Self {
        Self {
            connected: true,
            channels,
            voltages: [0.0; MAX_LANES],
        }
    }

    #[inline]
    pub fn voltage(&self, lane: usize) -> f32 {
        self.voltages.get(lane).copied().unwrap_or(0.0)
    }

    fn lanes(&self) -> Option<usize> {
        self.connected.then_some(self.channels)
    }
}

/// Input ports
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleInputs {
    pub clock: PortInput,
    pub reset: PortInput,
    pub modulation: PortInput,
}

/// Derived clock output port
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleOutputs {
    pub connected: bool,
    /// Channel count reported by the port
    pub channels: usize,
    pub voltages: [f32; MAX_LANES],
}

/// User-facing parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleParams {
    /// Ratio selection, -10 (slowest divide) to 10 (fastest multiply)
    pub main_knob: f32,
    /// Modulation depth, -1 to 1
    pub attenuverter: f32,
    pub categories: RatioCategories,
}

/// Port connection flags, polled on the connection divider
#[derive(Debug, Clone, Copy, Default)]
struct Connections {
    clock: bool,
    reset: bool,
    modulation: bool,
    output: bool,
}

/// The clock module
pub struct ClockModule {
    pub inputs: ModuleInputs,
    pub outputs: ModuleOutputs,
    params: ModuleParams,
    output_mode: PulseMode,
    catalog: RatioCatalog,
    topology: TopologyReconciler,
    followers: [ClockFollower; MAX_LANES],
    modulators: [ClockModulator; MAX_LANES],
    clock_triggers: [SchmittTrigger; MAX_LANES],
    reset_triggers: [SchmittTrigger; MAX_LANES],
    connection_updater: ClockDivider,
    channel_updater: ClockDivider,
    catalog_updater: ClockDivider,
    connections: Connections,
    link: ExpanderLink,
    /// Control value each lane resolved its ratio from
    lane_offsets: [f32; MAX_LANES],
}

impl Default for ClockModule {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ClockModule {
    pub fn new(config: &EngineConfig) -> Self {
        let followers =
            std::array::from_fn(|_| ClockFollower::with_stop_threshold(config.stop_threshold));
        let modulators = std::array::from_fn(|lane| {
            let mut modulator = ClockModulator::new(lane);
            modulator.set_pulse_mode(config.output_mode);
            modulator.set_trigger_length(config.trigger_length);
            modulator
        });
        let trigger = SchmittTrigger::new(config.trigger_low, config.trigger_high);

        // Housekeeping runs on the very first sample, then on its division
        let mut connection_updater = ClockDivider::new(config.connection_division);
        let mut channel_updater = ClockDivider::new(config.channel_division);
        let mut catalog_updater = ClockDivider::new(config.catalog_division);
        connection_updater.prime();
        channel_updater.prime();
        catalog_updater.prime();

        let params = ModuleParams {
            categories: config.categories,
            ..ModuleParams::default()
        };

        Self {
            inputs: ModuleInputs::default(),
            outputs: ModuleOutputs::default(),
            params,
            output_mode: config.output_mode,
            catalog: RatioCatalog::new(config.categories),
            topology: TopologyReconciler::new(),
            followers,
            modulators,
            clock_triggers: [trigger; MAX_LANES],
            reset_triggers: [trigger; MAX_LANES],
            connection_updater,
            channel_updater,
            catalog_updater,
            connections: Connections::default(),
            link: ExpanderLink::new(ModuleType::Clock),
            lane_offsets: [0.0; MAX_LANES],
        }
    }

    /// Advance one sample
    pub fn process(&mut self, neighbors: Neighbors<'_>) {
        self.link.update(&neighbors);

        if self.connection_updater.process() {
            self.update_connections();
        }
        if self.channel_updater.process() {
            self.update_channels();
        }
        if self.catalog_updater.process() {
            self.catalog.set_categories(self.params.categories);
        }

        let topology = self.topology.topology();
        let output_lanes = self.topology.output_lanes();

        let mut reset_edges = [false; MAX_LANES];
        for (lane, edge) in reset_edges
            .iter_mut()
            .enumerate()
            .take(topology.reset_lanes.unwrap_or(0))
        {
            *edge = self.reset_triggers[lane].process(self.inputs.reset.voltage(lane));
        }

        // Controller banks of an expander on the right override the knob
        let control =
            (self.link.right_type() == ModuleType::Expander).then(|| *self.link.control());

        for lane in 0..output_lanes {
            let follower = self.modulators[lane].follower().min(MAX_LANES - 1);
            let follower = &self.followers[follower];
            let modulator = &mut self.modulators[lane];

            if let Some(reset) = self.topology.reset_lane(lane) {
                if reset_edges[reset] {
                    modulator.reset(follower);
                }
            }

            let knob = control
                .and_then(|c| c.controller(lane))
                .unwrap_or(self.params.main_knob);
            let modulation = self
                .topology
                .mod_lane(lane)
                .map(|m| self.inputs.modulation.voltage(m) * self.params.attenuverter)
                .unwrap_or(0.0);
            let offset = (knob + modulation).clamp(-CONTROL_RANGE, CONTROL_RANGE);
            self.lane_offsets[lane] = offset;

            let (ratio, label) = self.catalog.resolve(offset);
            if modulator.set_ratio(ratio, follower) {
                modulator.set_label(label);
            }
        }
        self.lane_offsets[output_lanes..].fill(0.0);

        for lane in 0..self.topology.clock_lanes() {
            let follower = &mut self.followers[lane];
            follower.step();
            if self.clock_triggers[lane].process(self.inputs.clock.voltage(lane)) {
                follower.tick();
            }
        }

        for lane in 0..MAX_LANES {
            self.outputs.voltages[lane] = if lane < output_lanes {
                let follower = self.modulators[lane].follower().min(MAX_LANES - 1);
                let modulator = &mut self.modulators[lane];
                modulator.step(&self.followers[follower]);
                modulator.value()
            } else {
                PULSE_LOW
            };
        }

        if let Some(right) = neighbors.right {
            if self.link.right_active() {
                let report = self.lane_report();
                self.link.send_status(right, Some(&report));
            }
        }
    }

    fn update_connections(&mut self) {
        self.connections = Connections {
            clock: self.inputs.clock.connected,
            reset: self.inputs.reset.connected,
            modulation: self.inputs.modulation.connected,
            output: self.outputs.connected,
        };
    }

    fn update_channels(&mut self) {
        let clock = self.inputs.clock.lanes().filter(|_| self.connections.clock);
        let reset = self.inputs.reset.lanes().filter(|_| self.connections.reset);
        let modulation = self
            .inputs
            .modulation
            .lanes()
            .filter(|_| self.connections.modulation);

        if self.topology.reconcile(clock, reset, modulation) {
            for output in 0..self.topology.output_lanes() {
                if let Some(index) = self.topology.follower_lane(output) {
                    self.modulators[output].bind(index, &self.followers[index]);
                }
            }
        }

        if self.connections.output {
            self.outputs.channels = self.topology.output_channels();
        }
    }

    fn lane_report(&self) -> LaneReport {
        LaneReport {
            active_channels: self.topology.output_lanes(),
            labels: std::array::from_fn(|lane| self.modulators[lane].label()),
            values: self.lane_offsets,
            outputs: self.outputs.voltages,
        }
    }

    /// Restart every active derived clock, as a reset edge on each lane would
    pub fn reset_lanes(&mut self) {
        for lane in 0..self.topology.output_lanes() {
            let follower = self.modulators[lane].follower().min(MAX_LANES - 1);
            self.modulators[lane].reset(&self.followers[follower]);
        }
    }

    /// Return to the power-on state: every follower forgets its clock, the
    /// derived clocks go silent and lane counts are polled again on the next
    /// sample. Parameters and output mode are kept.
    pub fn reset(&mut self) {
        for follower in &mut self.followers {
            follower.reset();
        }
        for modulator in &mut self.modulators {
            modulator.clear();
        }
        for trigger in self
            .clock_triggers
            .iter_mut()
            .chain(self.reset_triggers.iter_mut())
        {
            trigger.reset();
        }

        self.topology = TopologyReconciler::new();
        self.connection_updater.prime();
        self.channel_updater.prime();
        self.catalog_updater.prime();
        self.lane_offsets = [0.0; MAX_LANES];
        self.outputs.voltages = [PULSE_LOW; MAX_LANES];

        tracing::debug!("clock module reset");
    }

    pub fn params(&self) -> ModuleParams {
        self.params
    }

    pub fn set_main_knob(&mut self, value: f32) {
        if value.is_finite() {
            self.params.main_knob = value.clamp(-CONTROL_RANGE, CONTROL_RANGE);
        }
    }

    pub fn set_attenuverter(&mut self, value: f32) {
        if value.is_finite() {
            self.params.attenuverter = value.clamp(-1.0, 1.0);
        }
    }

    /// Takes effect on the next catalog poll
    pub fn set_categories(&mut self, categories: RatioCategories) {
        self.params.categories = categories;
    }

    /// Apply restored parameters, rebuilding the catalog right away so the
    /// restored knob resolves to the saved ratio on the next sample
    pub(crate) fn set_params(&mut self, params: ModuleParams) {
        self.set_main_knob(params.main_knob);
        self.set_attenuverter(params.attenuverter);
        self.set_categories(params.categories);
        self.catalog.set_categories(self.params.categories);
    }

    pub fn output_mode(&self) -> PulseMode {
        self.output_mode
    }

    pub fn set_output_mode(&mut self, mode: PulseMode) {
        self.output_mode = mode;
        for modulator in &mut self.modulators {
            modulator.set_pulse_mode(mode);
        }
    }

    pub fn catalog(&self) -> &RatioCatalog {
        &self.catalog
    }

    pub fn topology(&self) -> Topology {
        self.topology.topology()
    }

    pub fn output_lanes(&self) -> usize {
        self.topology.output_lanes()
    }

    pub fn followers(&self) -> &[ClockFollower; MAX_LANES] {
        &self.followers
    }

    pub fn modulators(&self) -> &[ClockModulator; MAX_LANES] {
        &self.modulators
    }

    pub(crate) fn lanes_mut(
        &mut self,
    ) -> (
        &mut [ClockFollower; MAX_LANES],
        &mut [ClockModulator; MAX_LANES],
    ) {
        (&mut self.followers, &mut self.modulators)
    }

    pub(crate) fn triggers(&self) -> (&[SchmittTrigger; MAX_LANES], &[SchmittTrigger; MAX_LANES]) {
        (&self.clock_triggers, &self.reset_triggers)
    }

    pub(crate) fn triggers_mut(
        &mut self,
    ) -> (
        &mut [SchmittTrigger; MAX_LANES],
        &mut [SchmittTrigger; MAX_LANES],
    ) {
        (&mut self.clock_triggers, &mut self.reset_triggers)
    }

    pub fn label(&self, lane: usize) -> RatioLabel {
        self.modulators
            .get(lane)
            .map(ClockModulator::label)
            .unwrap_or_default()
    }

    pub fn link(&self) -> &ExpanderLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut ExpanderLink {
        &mut self.link
    }
}
