//! Chain host - a row of adjacent modules stepped together
//!
//! Modules process left to right, then every message slot flips, so each hop
//! along the row adds one sample of latency.

use crate::expander::{ExpanderLink, ModuleType, Neighbors};
use crate::expander_module::ExpanderModule;
use crate::module::ClockModule;

/// A module placed in the chain
pub enum ChainModule {
    Clock(Box<ClockModule>),
    Expander(Box<ExpanderModule>),
    /// Any other module; its link never becomes active
    Foreign(ExpanderLink),
}

impl ChainModule {
    /// Placeholder for a module that does not speak the link protocol
    pub fn foreign() -> Self {
        ChainModule::Foreign(ExpanderLink::new(ModuleType::None))
    }

    fn link_mut(&mut self) -> &mut ExpanderLink {
        match self {
            ChainModule::Clock(module) => module.link_mut(),
            ChainModule::Expander(module) => module.link_mut(),
            ChainModule::Foreign(link) => link,
        }
    }

    fn process(&mut self, neighbors: Neighbors<'_>) {
        match self {
            ChainModule::Clock(module) => module.process(neighbors),
            ChainModule::Expander(module) => module.process(neighbors),
            ChainModule::Foreign(_) => {}
        }
    }
}

/// Adjacent modules, left to right
#[derive(Default)]
pub struct Chain {
    modules: Vec<ChainModule>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module on the right end; returns its position
    pub fn push(&mut self, module: ChainModule) -> usize {
        self.modules.push(module);
        self.modules.len() - 1
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn clock_mut(&mut self, position: usize) -> Option<&mut ClockModule> {
        match self.modules.get_mut(position)? {
            ChainModule::Clock(module) => Some(module.as_mut()),
            _ => None,
        }
    }

    pub fn expander(&self, position: usize) -> Option<&ExpanderModule> {
        match self.modules.get(position)? {
            ChainModule::Expander(module) => Some(module.as_ref()),
            _ => None,
        }
    }

    pub fn expander_mut(&mut self, position: usize) -> Option<&mut ExpanderModule> {
        match self.modules.get_mut(position)? {
            ChainModule::Expander(module) => Some(module.as_mut()),
            _ => None,
        }
    }

    /// Advance every module by one sample and complete the message exchange
    pub fn step(&mut self) {
        for position in 0..self.modules.len() {
            let (before, rest) = self.modules.split_at_mut(position);
            let Some((current, after)) = rest.split_first_mut() else {
                break;
            };

            let neighbors = Neighbors {
                left: before.last_mut().map(ChainModule::link_mut),
                right: after.first_mut().map(ChainModule::link_mut),
            };
            current.process(neighbors);
        }

        for module in &mut self.modules {
            module.link_mut().flip();
        }
    }
}
