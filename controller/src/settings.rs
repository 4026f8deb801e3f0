// Bench settings from the environment

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use tacho_governor::config::DEFAULT_SPEED;
use tacho_governor::TargetSpeed;

/// Calibration file used when `GOVERNOR_CALIBRATION` is not set
pub const DEFAULT_CALIBRATION_FILE: &str = "calibration.txt";

/// Host bench settings
#[derive(Debug, Clone, PartialEq)]
pub struct BenchSettings {
    /// Calibration text file
    pub calibration: PathBuf,
    /// Initial target speed
    pub speed: TargetSpeed,
    /// Initial load disturbance on the simulated motor (0.0..=1.0)
    pub load: f32,
    /// Stop after this long; run until Ctrl-C when `None`
    pub duration: Option<Duration>,
    /// Run the simulation on a virtual clock instead of in real time
    pub simulate: bool,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            calibration: PathBuf::from(DEFAULT_CALIBRATION_FILE),
            speed: DEFAULT_SPEED,
            load: 0.0,
            duration: None,
            simulate: false,
        }
    }
}

impl BenchSettings {
    /// Read `GOVERNOR_CALIBRATION`, `GOVERNOR_SPEED`, `GOVERNOR_LOAD`,
    /// `GOVERNOR_DURATION` (seconds) and `GOVERNOR_SIMULATE`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(path) = lookup("GOVERNOR_CALIBRATION") {
            settings.calibration = PathBuf::from(path);
        }
        if let Some(speed) = lookup("GOVERNOR_SPEED") {
            let rpm: u16 = speed
                .trim()
                .parse()
                .with_context(|| format!("Invalid GOVERNOR_SPEED: {}", speed))?;
            settings.speed = TargetSpeed::new(rpm);
        }
        if let Some(load) = lookup("GOVERNOR_LOAD") {
            let value: f32 = load
                .trim()
                .parse()
                .with_context(|| format!("Invalid GOVERNOR_LOAD: {}", load))?;
            if !(0.0..=1.0).contains(&value) {
                bail!("GOVERNOR_LOAD out of range (0.0..=1.0): {}", value);
            }
            settings.load = value;
        }
        if let Some(duration) = lookup("GOVERNOR_DURATION") {
            let secs: f32 = duration
                .trim()
                .parse()
                .with_context(|| format!("Invalid GOVERNOR_DURATION: {}", duration))?;
            if !secs.is_finite() || secs <= 0.0 {
                bail!("GOVERNOR_DURATION must be positive: {}", secs);
            }
            settings.duration = Some(Duration::from_secs_f32(secs));
        }

        if let Some(simulate) = lookup("GOVERNOR_SIMULATE") {
            settings.simulate = matches!(simulate.trim(), "1" | "true" | "yes");
        }

        Ok(settings)
    }
}
