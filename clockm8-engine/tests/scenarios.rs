use clockm8_engine::{
    Chain, ChainModule, ClockModule, ExpanderModule, Neighbors, PortInput, MAX_LANES,
};
use clockm8_timing::RatioLabel;

/// Index of the first sample where each output lane rises
fn rising_edges(levels: &[[f32; MAX_LANES]], lane: usize) -> Vec<usize> {
    let mut previous = 0.0;
    let mut edges = Vec::new();
    for (index, frame) in levels.iter().enumerate() {
        if frame[lane] > previous {
            edges.push(index);
        }
        previous = frame[lane];
    }
    edges
}

/// Drive a single module with 1-sample clock pulses; `periods[lane]` is the
/// spacing of clock lane `lane`
fn run_module(
    module: &mut ClockModule,
    samples: usize,
    periods: &[usize],
) -> Vec<[f32; MAX_LANES]> {
    module.inputs.clock = PortInput::connected(periods.len());
    module.outputs.connected = true;

    (0..samples)
        .map(|index| {
            for (lane, period) in periods.iter().enumerate() {
                let level = if index % period == 0 { 10.0 } else { 0.0 };
                module.inputs.clock.voltages[lane] = level;
            }
            module.process(Neighbors::none());
            module.outputs.voltages
        })
        .collect()
}

#[test]
fn test_multiply_by_two_scenario() {
    let mut module = ClockModule::default();
    // Fourth of 27 multipliers: x2
    module.set_main_knob(1.3);

    let levels = run_module(&mut module, 3600, &[1000]);
    assert_eq!(module.label(0), RatioLabel::Multiply(2.0));

    // The tick at 0 only starts learning; from the second tick on the
    // derived clock is exact
    assert_eq!(rising_edges(&levels, 0), vec![1000, 1500, 2000, 2500, 3000, 3500]);

    let gate = levels[1000..1500].iter().filter(|f| f[0] > 0.0).count();
    assert_eq!(gate, 250);
}

#[test]
fn test_divide_by_two_scenario() {
    let mut module = ClockModule::default();
    // Third of 26 dividers: /2
    module.set_main_knob(-1.0);

    let levels = run_module(&mut module, 6500, &[1000]);
    assert_eq!(module.label(0), RatioLabel::Divide(2.0));
    assert_eq!(module.modulators()[0].ratio(), 0.5);
    assert_eq!(rising_edges(&levels, 0), vec![2000, 4000, 6000]);
}

#[test]
fn test_multiply_spacing_with_uneven_period() {
    let mut module = ClockModule::default();
    module.set_main_knob(2.5);

    let levels = run_module(&mut module, 9009, &[1001]);
    assert_eq!(module.label(0), RatioLabel::Multiply(4.0));

    let edges = rising_edges(&levels, 0);
    for pair in edges.windows(2) {
        let gap = pair[1] - pair[0];
        assert!((249..=251).contains(&gap), "gap {} in {:?}", gap, edges);
    }
    let per_period = edges.iter().filter(|&&e| (5005..6006).contains(&e)).count();
    assert_eq!(per_period, 4);
}

#[test]
fn test_excess_outputs_follow_last_clock_lane() {
    let mut module = ClockModule::default();
    module.inputs.modulation = PortInput::connected(5);

    let levels = run_module(&mut module, 4000, &[500, 600, 700]);
    assert_eq!(module.output_lanes(), 5);

    let followers: Vec<usize> = module.modulators()[..5]
        .iter()
        .map(|m| m.follower())
        .collect();
    assert_eq!(followers, vec![0, 1, 2, 2, 2]);

    let last_clock = rising_edges(&levels, 2);
    assert_eq!(last_clock, vec![700, 1400, 2100, 2800, 3500]);
    assert_eq!(rising_edges(&levels, 3), last_clock);
    assert_eq!(rising_edges(&levels, 4), last_clock);
    assert!(rising_edges(&levels, 5).is_empty());
}

#[test]
fn test_stalled_clock_stops_once() {
    let mut module = ClockModule::default();
    module.set_main_knob(1.3);
    run_module(&mut module, 2001, &[1000]);

    // Clock goes silent after the tick at 2000
    module.inputs.clock.voltages[0] = 0.0;
    let mut stopped_at = None;
    let mut edges_after_stop = 0;
    let mut previous = 0.0;
    for index in 2001..8000 {
        module.process(Neighbors::none());
        let running = module.followers()[0].is_running();
        if !running && stopped_at.is_none() {
            stopped_at = Some(index);
        }
        let level = module.outputs.voltages[0];
        if stopped_at.is_some() && level > previous {
            edges_after_stop += 1;
        }
        previous = level;
    }

    // Expected tick at 3000, then 1001 samples overdue
    assert_eq!(stopped_at, Some(4001));
    assert_eq!(edges_after_stop, 0);
}

#[test]
fn test_status_reaches_expanders_one_hop_per_sample() {
    let mut chain = Chain::new();
    let clock = chain.push(ChainModule::Clock(Box::default()));
    let first = chain.push(ChainModule::Expander(Box::default()));
    let second = chain.push(ChainModule::Expander(Box::default()));

    if let Some(module) = chain.clock_mut(clock) {
        module.inputs.clock = PortInput::connected(1);
        module.outputs.connected = true;
    }

    let mut first_seen = None;
    let mut second_seen = None;
    for index in 0..1100 {
        if let Some(module) = chain.clock_mut(clock) {
            module.inputs.clock.voltages[0] = if index % 1000 == 0 { 10.0 } else { 0.0 };
        }
        chain.step();

        let lane_output = |position| chain.expander(position).map(|e| e.lane_output(0));
        if first_seen.is_none() && lane_output(first) == Some(10.0) {
            first_seen = Some(index);
        }
        if second_seen.is_none() && lane_output(second) == Some(10.0) {
            second_seen = Some(index);
        }
    }

    // The clock output rises at 1000
    assert_eq!(first_seen, Some(1000));
    assert_eq!(second_seen, Some(1001));

    let first = chain.expander(first).map(|e| (e.position(), e.is_attached()));
    let second = chain.expander(second).map(|e| (e.position(), e.is_attached()));
    assert_eq!(first, Some((0, true)));
    assert_eq!(second, Some((1, true)));
}

#[test]
fn test_expander_controls_clock_lanes() {
    let mut chain = Chain::new();
    let clock = chain.push(ChainModule::Clock(Box::default()));
    let expander = chain.push(ChainModule::Expander(Box::new(ExpanderModule::new())));

    if let Some(module) = chain.clock_mut(clock) {
        module.inputs.clock = PortInput::connected(1);
        module.outputs.connected = true;
    }
    if let Some(module) = chain.expander_mut(expander) {
        module.set_bank_a(true);
        module.set_controller(0, 1.3);
    }

    let mut edges = Vec::new();
    let mut previous = 0.0;
    for index in 0..2600 {
        if let Some(module) = chain.clock_mut(clock) {
            module.inputs.clock.voltages[0] = if index % 1000 == 0 { 10.0 } else { 0.0 };
        }
        chain.step();
        if let Some(module) = chain.clock_mut(clock) {
            let level = module.outputs.voltages[0];
            if level > previous {
                edges.push(index);
            }
            previous = level;
        }
    }

    // The main knob stays at x1; the controller selects x2
    assert_eq!(edges, vec![1000, 1500, 2000, 2500]);
    let label = chain.clock_mut(clock).map(|m| m.label(0));
    assert_eq!(label, Some(RatioLabel::Multiply(2.0)));
}

#[test]
fn test_incompatible_neighbor_blocks_link() {
    let mut chain = Chain::new();
    let clock = chain.push(ChainModule::Clock(Box::default()));
    chain.push(ChainModule::foreign());
    let expander = chain.push(ChainModule::Expander(Box::default()));

    if let Some(module) = chain.clock_mut(clock) {
        module.inputs.clock = PortInput::connected(1);
        module.outputs.connected = true;
    }
    for index in 0..1500 {
        if let Some(module) = chain.clock_mut(clock) {
            module.inputs.clock.voltages[0] = if index % 1000 == 0 { 10.0 } else { 0.0 };
        }
        chain.step();
    }

    let right_active = chain.clock_mut(clock).map(|m| m.link().right_active());
    assert_eq!(right_active, Some(false));

    let seen = chain.expander(expander).map(|e| (e.is_attached(), e.lane_output(0)));
    assert_eq!(seen, Some((false, 0.0)));
}
