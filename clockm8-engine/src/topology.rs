//! Lane topology - how many lanes each port carries and which lanes feed which

use serde::{Deserialize, Serialize};

/// Maximum number of polyphonic lanes per port
pub const MAX_LANES: usize = 16;

/// Lane counts per port; `None` means the port is not connected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub clock_lanes: Option<usize>,
    pub reset_lanes: Option<usize>,
    pub mod_lanes: Option<usize>,
    pub output_lanes: Option<usize>,
}

impl Topology {
    /// Derive the output lane count from the input lane counts
    ///
    /// With a clock connected the widest of clock, reset and modulation wins.
    /// Without a clock there is nothing to derive from.
    pub fn from_inputs(
        clock_lanes: Option<usize>,
        reset_lanes: Option<usize>,
        mod_lanes: Option<usize>,
    ) -> Self {
        let clamp = |lanes: Option<usize>| lanes.map(|n| n.min(MAX_LANES));
        let clock_lanes = clamp(clock_lanes);
        let reset_lanes = clamp(reset_lanes);
        let mod_lanes = clamp(mod_lanes);

        let output_lanes = match clock_lanes {
            Some(clock) if clock > 0 => Some(
                clock
                    .max(reset_lanes.unwrap_or(0))
                    .max(mod_lanes.unwrap_or(0)),
            ),
            other => other,
        };

        Self {
            clock_lanes,
            reset_lanes,
            mod_lanes,
            output_lanes,
        }
    }
}

/// Lane `lane` of a port carrying `count` lanes, falling back to the last one
#[inline]
fn fallback_lane(lane: usize, count: Option<usize>) -> Option<usize> {
    match count {
        Some(count) if count > 0 => Some(lane.min(count - 1)),
        _ => None,
    }
}

/// Tracks the topology between housekeeping passes and decides when output
/// lanes must be rebound to followers
#[derive(Debug, Clone, Default)]
pub struct TopologyReconciler {
    current: Topology,
}

impl TopologyReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology(&self) -> Topology {
        self.current
    }

    /// Apply freshly polled lane counts. Returns true when the clock or
    /// output lane count changed, i.e. output lanes need rebinding.
    pub fn reconcile(
        &mut self,
        clock_lanes: Option<usize>,
        reset_lanes: Option<usize>,
        mod_lanes: Option<usize>,
    ) -> bool {
        let next = Topology::from_inputs(clock_lanes, reset_lanes, mod_lanes);
        let rebind = next.clock_lanes != self.current.clock_lanes
            || next.output_lanes != self.current.output_lanes;

        if rebind {
            tracing::debug!(
                clock = ?next.clock_lanes,
                reset = ?next.reset_lanes,
                modulation = ?next.mod_lanes,
                outputs = ?next.output_lanes,
                "lane topology changed"
            );
        }

        self.current = next;
        rebind
    }

    /// Number of active output lanes (0 when not connected)
    pub fn output_lanes(&self) -> usize {
        self.current.output_lanes.unwrap_or(0)
    }

    /// Number of followed clock lanes (0 when not connected)
    pub fn clock_lanes(&self) -> usize {
        self.current.clock_lanes.unwrap_or(0)
    }

    /// Channel count the output port reports
    pub fn output_channels(&self) -> usize {
        self.output_lanes().max(1)
    }

    /// Follower driving the given output lane
    pub fn follower_lane(&self, output: usize) -> Option<usize> {
        fallback_lane(output, self.current.clock_lanes)
    }

    /// Reset input lane for the given output lane
    pub fn reset_lane(&self, output: usize) -> Option<usize> {
        fallback_lane(output, self.current.reset_lanes)
    }

    /// Modulation input lane for the given output lane
    pub fn mod_lane(&self, output: usize) -> Option<usize> {
        fallback_lane(output, self.current.mod_lanes)
    }
}
