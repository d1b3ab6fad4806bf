//! Clock engine - drives a clock module from blocks of input samples

use crate::config::EngineConfig;
use crate::expander::Neighbors;
use crate::module::{ClockModule, PortInput};
use crate::topology::MAX_LANES;
use clockm8_timing::{PulseMode, RatioCategories, RatioLabel};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Commands sent to the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    SetMainKnob(f32),
    SetAttenuverter(f32),
    /// Constant voltage on modulation lane 1; `None` disconnects the input
    SetModulation(Option<f32>),
    SetCategories(RatioCategories),
    SetOutputMode(PulseMode),
    /// Number of interleaved lanes in the clock blocks
    SetClockLanes(usize),
    /// Restart every derived clock
    ResetAll,
    /// Forget every learned clock and start over from the power-on state
    ResetModule,
    /// Replace the module state with a saved JSON state
    LoadState(String),
    /// Shutdown the engine
    Shutdown,
}

/// Snapshot of the module for display
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub output_lanes: usize,
    pub clock_lanes: usize,
    pub labels: [RatioLabel; MAX_LANES],
    pub ratios: [f32; MAX_LANES],
    /// Learned clock period per clock lane, in samples
    pub durations: [u64; MAX_LANES],
    pub running: [bool; MAX_LANES],
    /// Rising edges per output lane since the previous snapshot
    pub pulses: [u32; MAX_LANES],
}

/// Events sent from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateUpdate(Box<EngineSnapshot>),
    Error(String),
}

/// Engine state (held by the processing thread)
pub struct EngineState {
    module: ClockModule,
    clock_lanes: usize,
    sample_rate: u32,
    pulses: [u32; MAX_LANES],
    previous: [f32; MAX_LANES],
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        let mut module = ClockModule::new(config);
        module.inputs.clock = PortInput::connected(1);
        module.outputs.connected = true;

        Self {
            module,
            clock_lanes: 1,
            sample_rate: config.sample_rate,
            pulses: [0; MAX_LANES],
            previous: [0.0; MAX_LANES],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn module(&self) -> &ClockModule {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut ClockModule {
        &mut self.module
    }

    /// Process a command. Failures are returned as events for the caller.
    pub fn handle_command(&mut self, cmd: EngineCommand) -> Option<EngineEvent> {
        match cmd {
            EngineCommand::SetMainKnob(value) => self.module.set_main_knob(value),
            EngineCommand::SetAttenuverter(value) => self.module.set_attenuverter(value),
            EngineCommand::SetModulation(Some(voltage)) => {
                self.module.inputs.modulation = PortInput::connected(1);
                self.module.inputs.modulation.voltages[0] = voltage;
            }
            EngineCommand::SetModulation(None) => {
                self.module.inputs.modulation = PortInput::default();
            }
            EngineCommand::SetCategories(categories) => self.module.set_categories(categories),
            EngineCommand::SetOutputMode(mode) => self.module.set_output_mode(mode),
            EngineCommand::SetClockLanes(lanes) => {
                self.clock_lanes = lanes.clamp(1, MAX_LANES);
                self.module.inputs.clock = PortInput::connected(self.clock_lanes);
            }
            EngineCommand::ResetAll => self.module.reset_lanes(),
            EngineCommand::ResetModule => {
                self.module.reset();
                self.previous = [0.0; MAX_LANES];
            }
            EngineCommand::LoadState(json) => {
                if let Err(e) = self.module.from_json(&json) {
                    tracing::warn!(error = %e, "failed to load module state");
                    return Some(EngineEvent::Error(format!("Failed to load state: {}", e)));
                }
            }
            EngineCommand::Shutdown => {} // Handled at higher level
        }
        None
    }

    /// Generate current state for display; resets the pulse counters
    pub fn snapshot(&mut self) -> EngineEvent {
        let modulators = self.module.modulators();
        let followers = self.module.followers();

        let snapshot = EngineSnapshot {
            output_lanes: self.module.output_lanes(),
            clock_lanes: self.module.topology().clock_lanes.unwrap_or(0),
            labels: std::array::from_fn(|lane| modulators[lane].label()),
            ratios: std::array::from_fn(|lane| modulators[lane].ratio()),
            durations: std::array::from_fn(|lane| followers[lane].duration()),
            running: std::array::from_fn(|lane| followers[lane].is_running()),
            pulses: self.pulses,
        };
        self.pulses = [0; MAX_LANES];

        EngineEvent::StateUpdate(Box::new(snapshot))
    }

    /// Process a block
    ///
    /// `clock` holds interleaved frames of `clock_lanes` voltages; `output`
    /// receives interleaved frames of 16 lanes. Processes as many frames as
    /// both buffers hold.
    pub fn process_block(&mut self, clock: &[f32], output: &mut [f32]) {
        let frames = clock
            .chunks_exact(self.clock_lanes)
            .zip(output.chunks_exact_mut(MAX_LANES));

        for (input, out) in frames {
            self.module.inputs.clock.voltages[..input.len()].copy_from_slice(input);
            self.module.process(Neighbors::none());

            let voltages = &self.module.outputs.voltages;
            out.copy_from_slice(voltages);
            for lane in 0..MAX_LANES {
                if voltages[lane] > self.previous[lane] {
                    self.pulses[lane] += 1;
                }
                self.previous[lane] = voltages[lane];
            }
        }
    }
}

/// Handle to communicate with the engine
pub struct ClockEngine {
    /// Send commands to the engine thread
    pub command_tx: Sender<EngineCommand>,
    /// Receive events from the engine thread
    pub event_rx: Receiver<EngineEvent>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
}

impl ClockEngine {
    /// Create channels for engine communication
    pub fn create_channels() -> (
        Sender<EngineCommand>,
        Receiver<EngineCommand>,
        Sender<EngineEvent>,
        Receiver<EngineEvent>,
    ) {
        let (cmd_tx, cmd_rx) = bounded(1024);
        let (evt_tx, evt_rx) = bounded(1024);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    /// Create a new engine handle
    pub fn new(command_tx: Sender<EngineCommand>, event_rx: Receiver<EngineEvent>) -> Self {
        Self {
            command_tx,
            event_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send a command to the engine
    pub fn send(&self, cmd: EngineCommand) {
        if self.command_tx.try_send(cmd).is_err() {
            tracing::warn!("engine command queue full or closed, command dropped");
        }
    }

    /// Shared shutdown flag for the engine thread
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.try_send(EngineCommand::Shutdown);
    }
}
