//! 選択可能な動作点

use core::fmt;

/// 目標回転数 [RPM]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TargetSpeed(u16);

impl TargetSpeed {
    pub const RPM_33: Self = Self(33);
    pub const RPM_45: Self = Self(45);

    pub const fn new(rpm: u16) -> Self {
        Self(rpm)
    }

    pub const fn rpm(&self) -> u16 {
        self.0
    }

    /// この回転数に対応するタコメータ周波数 [Hz]
    pub fn reference_hz(&self, hz_per_rpm: f32) -> f32 {
        self.0 as f32 * hz_per_rpm
    }
}

impl From<u16> for TargetSpeed {
    fn from(rpm: u16) -> Self {
        Self(rpm)
    }
}

impl fmt::Display for TargetSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
