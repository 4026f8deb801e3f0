// Simulated turntable motor with tachometer output

use tacho_governor::PwmRange;

/// First-order motor model driven through an (inverted) PWM stage
#[derive(Debug, Clone)]
pub struct Plant {
    /// Speed at full drive without load [RPM]
    max_rpm: f32,
    /// Mechanical time constant [s]
    tau: f32,
    /// Tachometer pulses per second per RPM
    hz_per_rpm: f32,
    pwm: PwmRange,
    /// Current PWM compare value
    compare: u16,
    /// Load disturbance (0.0 = none, 1.0 = blocked)
    load: f32,
    rpm: f32,
    /// Fractional tachometer pulses not yet emitted
    phase: f32,
}

impl Plant {
    /// Create a motor at standstill with the drive off
    ///
    /// # Arguments
    /// * `max_rpm` - Unloaded speed at full drive
    /// * `tau` - Time constant [s]
    /// * `hz_per_rpm` - Tachometer frequency per RPM
    /// * `pwm` - PWM range of the drive stage
    pub fn new(max_rpm: f32, tau: f32, hz_per_rpm: f32, pwm: PwmRange) -> Self {
        Self {
            max_rpm,
            tau,
            hz_per_rpm,
            pwm,
            compare: pwm.low,
            load: 0.0,
            rpm: 0.0,
            phase: 0.0,
        }
    }

    pub fn set_pwm(&mut self, compare: u16) {
        self.compare = compare;
    }

    pub fn set_load(&mut self, load: f32) {
        self.load = load.clamp(0.0, 1.0);
    }

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    /// Tachometer frequency [Hz]
    pub fn frequency(&self) -> f32 {
        self.rpm * self.hz_per_rpm
    }

    /// Duty the drive stage currently applies
    pub fn drive(&self) -> f32 {
        self.pwm.command(self.compare)
    }

    /// Advance the model by `dt` seconds
    ///
    /// # Returns
    /// Number of tachometer rising edges during the step
    pub fn advance(&mut self, dt: f32) -> u32 {
        let target = self.max_rpm * self.drive() * (1.0 - self.load);
        self.rpm += (target - self.rpm) * (dt / self.tau).min(1.0);
        self.rpm = self.rpm.max(0.0);

        self.phase += self.frequency() * dt;
        let edges = self.phase.floor();
        self.phase -= edges;
        edges as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tacho_governor::config::{pwm, DEFAULT_HZ_PER_RPM};

    fn plant() -> Plant {
        Plant::new(
            66.0,
            0.5,
            DEFAULT_HZ_PER_RPM,
            PwmRange::new(pwm::DEFAULT_LOW, pwm::DEFAULT_HIGH),
        )
    }

    #[test]
    fn test_starts_at_standstill() {
        let mut plant = plant();
        assert_eq!(plant.drive(), 0.0);
        assert_eq!(plant.advance(0.1), 0);
    }

    #[test]
    fn test_steady_state_speed() {
        let mut plant = plant();
        let range = PwmRange::new(pwm::DEFAULT_LOW, pwm::DEFAULT_HIGH);
        plant.set_pwm(range.compare(0.5));
        let mut edges = 0;
        for _ in 0..10_000 {
            edges += plant.advance(0.001);
        }
        assert!((plant.rpm() - 33.0).abs() < 0.2);
        // ~520 Hz for ~9.5 s after spin-up
        assert!(edges > 4_500 && edges < 5_300, "edges={edges}");
    }

    #[test]
    fn test_load_slows_motor() {
        let mut plant = plant();
        plant.set_pwm(PwmRange::new(pwm::DEFAULT_LOW, pwm::DEFAULT_HIGH).compare(1.0));
        plant.set_load(0.5);
        for _ in 0..5_000 {
            plant.advance(0.001);
        }
        assert!((plant.rpm() - 33.0).abs() < 0.5);
    }
}
