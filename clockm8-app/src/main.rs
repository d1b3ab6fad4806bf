//! clockm8 - headless clock multiplier/divider
//!
//! Follows a generated clock in real time, sweeps the ratio knob and logs the
//! derived lanes.
//!
//! Usage: clockm8 [bpm] [seconds] [knob] [--resume]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use clockm8_engine::{
    ClockEngine, EngineCommand, EngineConfig, EngineEvent, EngineSnapshot, EngineState, MAX_LANES,
};
use clockm8_timing::CONTROL_RANGE;

/// Frames processed per block
const BLOCK_FRAMES: usize = 256;
/// Clock pulse width
const CLOCK_PULSE_MS: f64 = 5.0;
/// Interval between state updates
const STATE_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
/// Interval between knob changes
const SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Command line options
struct Args {
    bpm: f64,
    seconds: u64,
    knob: f32,
    resume: bool,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Self {
            bpm: 120.0,
            seconds: 8,
            knob: 0.0,
            resume: false,
        };

        let mut position = 0;
        for arg in args {
            if arg == "--resume" {
                parsed.resume = true;
                continue;
            }
            match position {
                0 => parsed.bpm = arg.parse().with_context(|| format!("invalid bpm: {arg}"))?,
                1 => {
                    parsed.seconds = arg
                        .parse()
                        .with_context(|| format!("invalid duration: {arg}"))?
                }
                2 => parsed.knob = arg.parse().with_context(|| format!("invalid knob: {arg}"))?,
                _ => bail!("unexpected argument: {arg}"),
            }
            position += 1;
        }

        if !(parsed.bpm > 0.0 && parsed.bpm.is_finite()) {
            bail!("bpm must be positive");
        }
        Ok(parsed)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = EngineConfig::load();
    tracing::info!(
        bpm = args.bpm,
        seconds = args.seconds,
        sample_rate = config.sample_rate,
        "starting clockm8"
    );

    let (cmd_tx, cmd_rx, evt_tx, evt_rx) = ClockEngine::create_channels();
    let engine = ClockEngine::new(cmd_tx, evt_rx);
    let state = Arc::new(Mutex::new(EngineState::new(&config)));

    // Spawn processing threads
    let render_handle = {
        let state = Arc::clone(&state);
        let shutdown = engine.shutdown_flag();
        let bpm = args.bpm;
        thread::spawn(move || run_render_thread(state, shutdown, bpm))
    };
    let command_handle = {
        let state = Arc::clone(&state);
        let shutdown = engine.shutdown_flag();
        thread::spawn(move || run_command_thread(state, cmd_rx, evt_tx, shutdown))
    };

    let state_path = state_path();
    if args.resume {
        match fs::read_to_string(&state_path) {
            Ok(json) => engine.send(EngineCommand::LoadState(json)),
            Err(e) => tracing::warn!(path = %state_path.display(), error = %e, "no saved state"),
        }
    }

    engine.send(EngineCommand::SetMainKnob(args.knob));
    run_session(&engine, args.knob, Duration::from_secs(args.seconds));

    engine.shutdown();
    let _ = render_handle.join();
    let _ = command_handle.join();

    let state = state.lock();
    state
        .module()
        .save_to(&state_path)
        .with_context(|| format!("failed to save state to {}", state_path.display()))?;
    tracing::info!(path = %state_path.display(), "state saved");

    Ok(())
}

/// Sweep the knob and log engine events until the session ends
fn run_session(engine: &ClockEngine, start_knob: f32, duration: Duration) {
    let started = Instant::now();
    let mut last_sweep = Instant::now();
    let mut knob = start_knob;

    while started.elapsed() < duration {
        match engine.event_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(EngineEvent::StateUpdate(snapshot)) => log_snapshot(&snapshot),
            Ok(EngineEvent::Error(message)) => tracing::error!("{}", message),
            Err(_) => {}
        }

        if last_sweep.elapsed() >= SWEEP_INTERVAL {
            knob += 2.5;
            if knob > CONTROL_RANGE {
                knob = -CONTROL_RANGE;
            }
            engine.send(EngineCommand::SetMainKnob(knob));
            last_sweep = Instant::now();
        }
    }
}

fn log_snapshot(snapshot: &EngineSnapshot) {
    for lane in 0..snapshot.output_lanes.min(MAX_LANES) {
        tracing::info!(
            lane,
            ratio = %snapshot.labels[lane],
            period = snapshot.durations[lane.min(snapshot.clock_lanes.saturating_sub(1))],
            running = snapshot.running[lane],
            pulses = snapshot.pulses[lane],
            "lane"
        );
    }
}

/// Generate the clock and run the module at the configured sample rate
fn run_render_thread(state: Arc<Mutex<EngineState>>, shutdown: Arc<AtomicBool>, bpm: f64) {
    let sample_rate = state.lock().sample_rate();
    let period = ((sample_rate as f64 * 60.0 / bpm) as u64).max(2);
    let pulse_width = ((sample_rate as f64 * CLOCK_PULSE_MS / 1000.0) as u64).clamp(1, period / 2);
    let block_duration = Duration::from_secs_f64(BLOCK_FRAMES as f64 / sample_rate as f64);

    let mut clock = vec![0.0f32; BLOCK_FRAMES];
    let mut output = vec![0.0f32; BLOCK_FRAMES * MAX_LANES];
    let mut frame: u64 = 0;
    let started = Instant::now();
    let mut blocks: u32 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        for sample in clock.iter_mut() {
            *sample = if frame % period < pulse_width { 10.0 } else { 0.0 };
            frame += 1;
        }

        state.lock().process_block(&clock, &mut output);

        // Pace blocks against the wall clock
        blocks += 1;
        let deadline = block_duration * blocks;
        if let Some(wait) = deadline.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }
}

/// Apply commands and publish state updates
fn run_command_thread(
    state: Arc<Mutex<EngineState>>,
    cmd_rx: Receiver<EngineCommand>,
    evt_tx: Sender<EngineEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let mut last_state_update = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        match cmd_rx.recv_timeout(Duration::from_millis(10)) {
            Ok(EngineCommand::Shutdown) => break,
            Ok(cmd) => {
                if let Some(event) = state.lock().handle_command(cmd) {
                    let _ = evt_tx.try_send(event);
                }
            }
            Err(_) => {}
        }

        if last_state_update.elapsed() >= STATE_UPDATE_INTERVAL {
            let event = state.lock().snapshot();
            let _ = evt_tx.try_send(event);
            last_state_update = Instant::now();
        }
    }
}

/// Where the module state is saved between runs
fn state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clockm8")
        .join("state.json")
}
