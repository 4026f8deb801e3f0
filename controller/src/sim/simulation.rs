// Deterministic closed-loop simulation on a virtual clock

use tacho_governor::{
    CalibrationBackend, ControlOutput, EdgeCounter, FrequencyCounter, Governor, PwmRange,
    TickSpace,
};

use super::Plant;

/// Model integration step [μs]
const STEP_US: u32 = 1_000;

/// Governor, frequency counter and motor model on one virtual clock
pub struct Simulation<B: CalibrationBackend> {
    pub governor: Governor<B>,
    pub plant: Plant,
    counter: FrequencyCounter,
    edges: EdgeCounter,
    pwm: PwmRange,
    now_us: u32,
    /// Time the control loop is blocked by a calibration write [μs]
    write_stall_us: u32,
}

impl<B: CalibrationBackend> Simulation<B> {
    /// # Arguments
    /// * `governor` - Governor created at tick `now_us`
    /// * `plant` - Motor model
    /// * `pwm` - PWM range between governor and motor
    /// * `now_us` - Virtual clock start
    pub fn new(governor: Governor<B>, plant: Plant, pwm: PwmRange, now_us: u32) -> Self {
        let counter = FrequencyCounter::new(governor.config().window, TickSpace::FULL);
        Self {
            governor,
            plant,
            counter,
            edges: EdgeCounter::new(),
            pwm,
            now_us,
            write_stall_us: 0,
        }
    }

    /// Block the loop for `us` after every calibration write, like a flash erase
    pub fn with_write_stall(mut self, us: u32) -> Self {
        self.write_stall_us = us;
        self
    }

    pub fn now_us(&self) -> u32 {
        self.now_us
    }

    /// Advance by one model step
    ///
    /// # Returns
    /// The control output when a measurement window closed in this step
    pub fn step(&mut self) -> Option<ControlOutput> {
        let edges = self.plant.advance(STEP_US as f32 / 1_000_000.0);
        for _ in 0..edges {
            self.edges.on_edge();
        }
        self.now_us = self.now_us.wrapping_add(STEP_US);

        let freq = self.counter.verify(&self.edges, self.now_us)?;
        let output = self.governor.update(freq, self.now_us);
        if output.persisted {
            self.stall(self.write_stall_us);
            self.counter.reset();
        }
        self.plant.set_pwm(self.pwm.compare(output.duty));
        Some(output)
    }

    /// Let the motor run on while no edges are counted
    fn stall(&mut self, us: u32) {
        for _ in 0..us / STEP_US {
            self.plant.advance(STEP_US as f32 / 1_000_000.0);
            self.now_us = self.now_us.wrapping_add(STEP_US);
        }
    }

    /// Run for `seconds` of virtual time, returning every control output
    pub fn run_for(&mut self, seconds: f32) -> Vec<ControlOutput> {
        let steps = (seconds * 1_000_000.0 / STEP_US as f32) as usize;
        (0..steps).filter_map(|_| self.step()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileBackend;
    use std::fs;
    use std::path::PathBuf;
    use tacho_governor::config::{pwm, DEFAULT_CALIBRATION};
    use tacho_governor::{CalibrationStore, ControlMode, GovernorConfig, TargetSpeed};

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tacho-governor-sim-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn simulation(path: &PathBuf, defaults: &[(u16, f32)]) -> Simulation<FileBackend> {
        let config = GovernorConfig::default();
        let range = PwmRange::new(pwm::DEFAULT_LOW, pwm::DEFAULT_HIGH);
        let mut store = CalibrationStore::new(FileBackend::new(path));
        store.load_or_defaults(defaults);
        let governor = Governor::new(config, TickSpace::FULL, store, TargetSpeed::RPM_33, 0);
        let plant = Plant::new(66.0, 0.5, config.hz_per_rpm, range);
        Simulation::new(governor, plant, range, 0)
    }

    #[test]
    fn test_one_output_per_window() {
        let path = temp_path("windows");
        let mut sim = simulation(&path, DEFAULT_CALIBRATION);
        let outputs = sim.run_for(2.0);
        // the first window only arms the counter
        assert_eq!(outputs.len(), 19);
        assert_eq!(outputs[0].duty, 1.0);
    }

    #[test]
    fn test_start_from_standstill_converges_and_captures() {
        let path = temp_path("converge");
        let mut sim = simulation(&path, &[]);
        let outputs = sim.run_for(30.0);

        assert!(outputs.iter().any(|o| o.mode == ControlMode::Manual));
        let last = outputs.last().unwrap();
        assert_eq!(last.mode, ControlMode::Pid);
        assert!(last.status.hit, "freq={}", last.freq);

        let text = fs::read_to_string(&path).unwrap();
        let entries = tacho_governor::calibration::parse(&text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].speed, TargetSpeed::RPM_33);
        assert!((entries[0].duty - 0.5).abs() < 0.05, "duty={}", entries[0].duty);
    }

    #[test]
    fn test_write_stall_is_captured_once() {
        let path = temp_path("write-stall");
        let mut sim = simulation(&path, &[]).with_write_stall(22_000);
        let outputs = sim.run_for(60.0);

        assert_eq!(outputs.iter().filter(|o| o.persisted).count(), 1);
        // the stalled window is discarded, so PID is never interrupted
        assert!(outputs
            .iter()
            .skip_while(|o| !o.persisted)
            .all(|o| o.mode == ControlMode::Pid));
    }

    #[test]
    fn test_mild_load_is_regulated_by_pid() {
        let path = temp_path("mild-load");
        let mut sim = simulation(&path, DEFAULT_CALIBRATION);
        sim.run_for(20.0);
        sim.plant.set_load(0.05);
        let outputs = sim.run_for(20.0);

        assert!(outputs.iter().all(|o| o.mode == ControlMode::Pid));
        let tail = &outputs[outputs.len() - 20..];
        let freq = tail.iter().map(|o| o.freq).sum::<f32>() / tail.len() as f32;
        let duty = tail.iter().map(|o| o.duty).sum::<f32>() / tail.len() as f32;
        assert!((freq - 520.0).abs() < 10.0, "freq={}", freq);
        // load is compensated by a higher duty
        assert!(duty > 0.5, "duty={}", duty);
    }

    #[test]
    fn test_stall_drops_back_to_manual() {
        let path = temp_path("stall");
        let mut sim = simulation(&path, DEFAULT_CALIBRATION);
        sim.run_for(20.0);
        sim.plant.set_load(0.6);
        let outputs = sim.run_for(1.0);
        assert_eq!(outputs.last().unwrap().mode, ControlMode::Manual);
    }
}
