// Real-time bench: governor core driving the simulated motor

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tacho_governor::config::{pwm, DEFAULT_CALIBRATION};
use tacho_governor::{
    command, CalibrationStore, Clock, Command, CommandError, EdgeCounter, FrequencyCounter,
    Governor, GovernorConfig, PwmRange, TickSpace,
};

use crate::clock::HostClock;
use crate::settings::BenchSettings;
use crate::sim::{Plant, Simulation};
use crate::storage::FileBackend;

/// Tachometer pulses, incremented by the tacho task
static EDGES: EdgeCounter = EdgeCounter::new();

/// Simulated motor: unloaded speed at full drive [RPM]
const PLANT_MAX_RPM: f32 = 66.0;
/// Simulated motor: time constant [s]
const PLANT_TAU: f32 = 0.5;
/// Model step of the tacho task [ms]
const TACHO_STEP_MS: u64 = 1;
/// Control loop polling period [ms]
const CONTROL_POLL_MS: u64 = 5;

/// Virtual run length when no duration is configured [s]
const SIMULATION_SECONDS: f32 = 30.0;

/// Request from the stdin command channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BenchCommand {
    Governor(Command),
    /// Change the simulated load disturbance
    Load(f32),
}

/// Parse a command line; `load=<0..1>` is handled by the bench itself
pub fn parse_line(line: &str) -> Result<BenchCommand, CommandError> {
    if let Some((key, value)) = line.trim().split_once('=') {
        if key.trim() == "load" {
            let load: f32 = value
                .trim()
                .parse()
                .map_err(|_| CommandError::InvalidValue)?;
            if !(0.0..=1.0).contains(&load) {
                return Err(CommandError::InvalidValue);
            }
            return Ok(BenchCommand::Load(load));
        }
    }
    command::parse(line).map(BenchCommand::Governor)
}

fn build_governor(settings: &BenchSettings, now_us: u32) -> Governor<FileBackend> {
    let mut store = CalibrationStore::new(FileBackend::new(&settings.calibration));
    if store.load_or_defaults(DEFAULT_CALIBRATION) {
        info!(
            "Calibration loaded from {}",
            settings.calibration.display()
        );
    }
    Governor::new(
        GovernorConfig::default(),
        TickSpace::of::<HostClock>(),
        store,
        settings.speed,
        now_us,
    )
}

fn build_plant(settings: &BenchSettings, config: &GovernorConfig, range: PwmRange) -> Plant {
    let mut plant = Plant::new(PLANT_MAX_RPM, PLANT_TAU, config.hz_per_rpm, range);
    plant.set_load(settings.load);
    plant
}

/// Run the closed loop on a virtual clock as fast as possible
pub fn simulate(settings: BenchSettings) -> Result<()> {
    let range = PwmRange::new(pwm::DEFAULT_LOW, pwm::DEFAULT_HIGH);
    let governor = build_governor(&settings, 0);
    let plant = build_plant(&settings, governor.config(), range);
    let seconds = settings
        .duration
        .map(|d| d.as_secs_f32())
        .unwrap_or(SIMULATION_SECONDS);

    info!("Simulating {}s", seconds);
    let mut sim = Simulation::new(governor, plant, range, 0);
    for output in sim.run_for(seconds) {
        println!("{}", output.telemetry());
    }
    info!("Final motor speed {:.2} RPM", sim.plant.rpm());
    Ok(())
}

/// Run the bench until Ctrl-C or the configured duration elapses
pub async fn run(settings: BenchSettings) -> Result<()> {
    let range = PwmRange::new(pwm::DEFAULT_LOW, pwm::DEFAULT_HIGH);
    let clock = HostClock::new();
    let mut governor = build_governor(&settings, clock.now_us());
    let config = *governor.config();
    let mut counter = FrequencyCounter::new(config.window, TickSpace::of::<HostClock>());
    let plant = Arc::new(Mutex::new(build_plant(&settings, &config, range)));

    let tacho = tokio::spawn(tacho_task(plant.clone()));

    let (tx, mut rx) = mpsc::channel(16);
    let commands = tokio::spawn(command_task(tx));

    let deadline = settings.duration.map(|d| Instant::now() + d);
    let mut poll = interval(Duration::from_millis(CONTROL_POLL_MS));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Bench running (Ctrl-C to stop)");
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let now_us = clock.now_us();
                if let Some(freq) = counter.verify(&EDGES, now_us) {
                    let output = governor.update(freq, now_us);
                    if output.persisted {
                        // the window spanning the file write is not representative
                        counter.reset();
                    }
                    plant.lock().await.set_pwm(range.compare(output.duty));
                    println!("{}", output.telemetry());
                }
            }
            Some(request) = rx.recv() => match request {
                BenchCommand::Governor(command) => governor.apply(command, clock.now_us()),
                BenchCommand::Load(load) => {
                    info!("Load -> {}", load);
                    plant.lock().await.set_load(load);
                }
            },
            _ = sleep_until(deadline) => {
                info!("Bench duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted");
                break;
            }
        }
    }

    tacho.abort();
    commands.abort();

    for entry in governor.store().entries() {
        info!("Calibration {}: {}", entry.speed, entry.duty);
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Advance the motor model in real time and feed its pulses to the counter
async fn tacho_task(plant: Arc<Mutex<Plant>>) {
    let mut ticker = interval(Duration::from_millis(TACHO_STEP_MS));
    let mut last = Instant::now();
    loop {
        ticker.tick().await;
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        let edges = plant.lock().await.advance(dt);
        for _ in 0..edges {
            EDGES.on_edge();
        }
    }
}

/// Read `key=value` lines from stdin
async fn command_task(tx: mpsc::Sender<BenchCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(request) => {
                        debug!("Command: {:?}", request);
                        if tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring command {:?}: {}", line, e),
                }
            }
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                warn!("stdin read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tacho_governor::TargetSpeed;

    #[test]
    fn test_parse_load() {
        assert_eq!(parse_line("load=0.25"), Ok(BenchCommand::Load(0.25)));
        assert_eq!(parse_line("load=2"), Err(CommandError::InvalidValue));
    }

    #[test]
    fn test_parse_governor_commands() {
        assert_eq!(
            parse_line("speed=45"),
            Ok(BenchCommand::Governor(Command::Speed(TargetSpeed::RPM_45)))
        );
        assert_eq!(
            parse_line("Kp=0.004"),
            Ok(BenchCommand::Governor(Command::Kp(0.004)))
        );
        assert_eq!(parse_line("gain=1"), Err(CommandError::UnknownKey));
    }
}
