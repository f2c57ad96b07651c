//! Host-side simulator: wires `grbl4-core`'s motion pipeline to
//! `grbl4-mcu`'s fake hardware backend across three threads, mirroring the
//! controller's real priority split (spec.md §5): a foreground thread
//! submitting commands, a background thread ticking the planner/segment
//! queue, and an ISR-equivalent thread pulsing the executor on a sleep
//! loop timed from each segment's `period_us`.
//!
//! Grounded on `krusty_simulator/src/sim/harness.rs` for the clap-driven
//! scenario CLI shape and on its `main.rs` for the CSV-trace-output
//! convention; the GCode-replay/thermal-event body of both is replaced
//! outright; this simulator has no thermal model and does not replay
//! files, it drives a small fixed set of built-in motion scenarios.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use csv::Writer;
use serde::Serialize;

use grbl4_mcu::fake::FakeMcu;
use grbl4_core::executor::PulseOutcome;
use grbl4_core::manager::{MotionManager, MotionState};
use grbl4_core::settings::Settings;
use grbl4_core::types::{Condition, Position, AXES};
use grbl4_core::{expand_arc, Plane};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum Scenario {
    ColdStart,
    Corner,
    FullStop,
    QuarterArc,
    Backpressure,
    EmergencyStop,
}

/// Motion simulation harness: runs one built-in scenario end to end
/// against the fake MCU backend.
#[derive(Parser, Debug)]
#[command(name = "grbl4-simulator")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Scenario::ColdStart)]
    scenario: Scenario,

    /// Optional CSV trace of sampled positions, one row per background tick.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TraceRow {
    tick: u64,
    state: String,
    x: f64,
    y: f64,
    z: f64,
    a: f64,
}

enum Command {
    Move { target: Position, feed_rate: f64 },
    Arc { target: Position, offset: (f64, f64), clockwise: bool, feed_rate: f64 },
    FeedHold,
    CycleStart,
    EmergencyStop,
    Shutdown,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let scenario = cli.scenario;

    let settings = Settings::new([250.0; AXES], [6000.0; AXES], [500.0; AXES]);
    let manager = MotionManager::new(grbl4_core::planner::Planner::new(16, settings), 64);
    let executor = manager.executor();

    let shutdown = Arc::new(AtomicBool::new(false));
    let status: Arc<Mutex<MotionState>> = Arc::new(Mutex::new(MotionState::Idle));
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<Command>();

    let trace: Arc<Mutex<Vec<TraceRow>>> = Arc::new(Mutex::new(Vec::new()));

    // Background thread: owns the planner/segment queue exclusively, the
    // only writer of MotionManager state. Mirrors spec.md §5's
    // background-priority tick.
    let background = {
        let status = Arc::clone(&status);
        let trace = Arc::clone(&trace);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            let mut manager = manager;
            let mut tick_count = 0u64;
            loop {
                for cmd in cmd_rx.try_iter() {
                    match cmd {
                        Command::Move { target, feed_rate } => {
                            if let Err(e) = manager.queue_move(target, feed_rate, Condition::default()) {
                                tracing::warn!("move rejected: {e}");
                            }
                        }
                        Command::Arc { target, offset, clockwise, feed_rate } => {
                            let current = manager.planner_mut().planned_position_mm();
                            match expand_arc(
                                manager.planner_mut(),
                                Plane::Xy,
                                current,
                                target,
                                offset,
                                clockwise,
                                feed_rate,
                                Condition::default(),
                            ) {
                                Ok(n) => tracing::info!("arc expanded into {n} chords"),
                                Err(e) => tracing::warn!("arc rejected: {e}"),
                            }
                        }
                        Command::FeedHold => manager.feed_hold(),
                        Command::CycleStart => manager.cycle_start(),
                        Command::EmergencyStop => {
                            manager.emergency_stop();
                            tracing::warn!("emergency stop: queue cleared, position resynced");
                        }
                        Command::Shutdown => {
                            shutdown.store(true, Ordering::Relaxed);
                        }
                    }
                }

                manager.tick();
                let state = manager.state();
                *status.lock().unwrap() = state;

                let pos = manager.position_mm();
                trace.lock().unwrap().push(TraceRow {
                    tick: tick_count,
                    state: format!("{state:?}"),
                    x: pos[0],
                    y: pos[1],
                    z: pos[2],
                    a: pos[3],
                });
                tick_count += 1;

                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        })
    };

    // ISR-equivalent thread: pulses the executor on a cadence read from
    // the currently-armed segment's period.
    let isr = {
        let executor = Arc::clone(&executor);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            let mut mcu = FakeMcu::new();
            mcu.enable_all();
            loop {
                match executor.period_us() {
                    Some(period_us) => {
                        std::thread::sleep(Duration::from_micros(period_us.max(1.0) as u64));
                        match executor.on_pulse(&mut mcu) {
                            PulseOutcome::Idle | PulseOutcome::Continuing | PulseOutcome::SegmentDone => {}
                        }
                    }
                    None => std::thread::sleep(Duration::from_micros(200)),
                }
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        })
    };

    run_scenario(scenario, &cmd_tx, &status, &executor);

    cmd_tx.send(Command::Shutdown).ok();
    background.join().ok();
    isr.join().ok();

    if let Some(path) = cli.output {
        let mut wtr = Writer::from_path(&path).expect("failed to create trace CSV");
        for row in trace.lock().unwrap().iter() {
            wtr.serialize(row).expect("failed to write trace row");
        }
        wtr.flush().expect("failed to flush trace CSV");
        tracing::info!("trace written to {}", path.display());
    }
}

fn wait_idle(status: &Arc<Mutex<MotionState>>, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if *status.lock().unwrap() == MotionState::Idle {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn run_scenario(
    scenario: Scenario,
    cmd_tx: &crossbeam_channel::Sender<Command>,
    status: &Arc<Mutex<MotionState>>,
    executor: &Arc<grbl4_core::executor::SegmentExecutor>,
) {
    match scenario {
        Scenario::ColdStart => {
            cmd_tx
                .send(Command::Move { target: [10.0, 0.0, 0.0, 0.0], feed_rate: 3000.0 })
                .ok();
            wait_idle(status, Duration::from_secs(5));
            tracing::info!("final position steps: {:?}", executor.position_steps());
        }
        Scenario::Corner => {
            cmd_tx
                .send(Command::Move { target: [10.0, 0.0, 0.0, 0.0], feed_rate: 6000.0 })
                .ok();
            cmd_tx
                .send(Command::Move { target: [10.0, 10.0, 0.0, 0.0], feed_rate: 6000.0 })
                .ok();
            wait_idle(status, Duration::from_secs(5));
            tracing::info!("final position steps: {:?}", executor.position_steps());
        }
        Scenario::FullStop => {
            for i in 1..=5 {
                cmd_tx
                    .send(Command::Move { target: [i as f64 * 2.0, 0.0, 0.0, 0.0], feed_rate: 1500.0 })
                    .ok();
            }
            wait_idle(status, Duration::from_secs(5));
            tracing::info!("final position steps: {:?}", executor.position_steps());
        }
        Scenario::QuarterArc => {
            cmd_tx
                .send(Command::Arc {
                    target: [10.0, 10.0, 0.0, 0.0],
                    offset: (0.0, 10.0),
                    clockwise: false,
                    feed_rate: 3000.0,
                })
                .ok();
            wait_idle(status, Duration::from_secs(5));
            tracing::info!("final position steps: {:?}", executor.position_steps());
        }
        Scenario::Backpressure => {
            for i in 1..=64 {
                cmd_tx
                    .send(Command::Move { target: [i as f64, 0.0, 0.0, 0.0], feed_rate: 6000.0 })
                    .ok();
            }
            wait_idle(status, Duration::from_secs(10));
            tracing::info!("final position steps: {:?}", executor.position_steps());
        }
        Scenario::EmergencyStop => {
            cmd_tx
                .send(Command::Move { target: [100.0, 0.0, 0.0, 0.0], feed_rate: 3000.0 })
                .ok();
            std::thread::sleep(Duration::from_millis(50));
            cmd_tx.send(Command::EmergencyStop).ok();
            wait_idle(status, Duration::from_secs(2));
            tracing::info!(
                "stopped mid-move at position steps: {:?}",
                executor.position_steps()
            );
        }
    }
}
