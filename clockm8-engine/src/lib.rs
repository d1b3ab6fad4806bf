//! Clock module for clockm8 - lanes, expander link, persistence and engine
//!
//! This crate hosts the timing primitives as a polyphonic module:
//! - ClockModule: per-sample processing over 16 lanes
//! - Topology: lane counts and output-to-follower fallback
//! - Expander: double-buffered messages between adjacent modules
//! - Chain: steps a row of modules and flips their messages
//! - Persistence: JSON save/restore of the full timing state
//! - Engine: command/event handle for a processing thread

mod chain;
mod config;
mod engine;
mod expander;
mod expander_module;
mod module;
mod persistence;
mod topology;

pub use chain::{Chain, ChainModule};
pub use config::{ConfigError, EngineConfig};
pub use engine::{ClockEngine, EngineCommand, EngineEvent, EngineSnapshot, EngineState};
pub use expander::{
    ControlMessage, ExpanderLink, LaneReport, LinkMessage, MessageSlot, ModuleType, Neighbors,
    StatusMessage, TransportMessage,
};
pub use expander_module::ExpanderModule;
pub use module::{ClockModule, ModuleInputs, ModuleOutputs, ModuleParams, PortInput};
pub use persistence::{ModuleState, PersistError};
pub use topology::{Topology, TopologyReconciler, MAX_LANES};
