//! ガバナの実行時設定

use fugit::{MicrosDurationU32, MillisDurationU32};

use super::params::{self, pid, thresholds};
use crate::pid::PidGains;

/// ガバナの調整値
///
/// 切替しきい値はすべて独立。MANUAL→PIDとPID→MANUALの境界を離してチャタリングを防ぐ。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernorConfig {
    /// 計測窓かつ制御周期
    pub window: MicrosDurationU32,
    /// 1 RPMあたりのタコメータ周波数 [Hz]
    pub hz_per_rpm: f32,

    /// 目標到達とみなす相対誤差
    pub accuracy: f32,
    /// 相対誤差がこれ未満でMANUALからPIDへ移る
    pub enter_pid_band: f32,
    /// `drop_ratio * reference`未満でPIDからMANUALへ戻る
    pub drop_ratio: f32,
    /// `kick_ratio * reference`未満でMANUALはフルパワーでキックする
    pub kick_ratio: f32,
    /// `switch_off_ratio * reference`未満で電源断を疑う
    pub switch_off_ratio: f32,
    pub switch_off_hold: MillisDurationU32,
    pub manual_timeout: MillisDurationU32,
    pub capture_hold: MillisDurationU32,

    /// キャリブレーションがないときのオープンループデューティ
    pub fallback_duty: f32,

    pub kp: f32,
    /// 積分時間 [s]
    pub ti: f32,
    /// 微分時間 [s]
    pub td: f32,
    pub output_bounds: (f32, f32),
}

impl GovernorConfig {
    /// `kp`と`ti`と`td`から求めたPIDゲイン
    pub fn gains(&self) -> PidGains {
        PidGains::from_time_constants(self.kp, self.ti, self.td)
    }

    /// 制御周期 [s]
    pub fn sample_period(&self) -> f32 {
        self.window.ticks() as f32 / 1_000_000.0
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            window: MicrosDurationU32::millis(params::DEFAULT_WINDOW_MS),
            hz_per_rpm: params::DEFAULT_HZ_PER_RPM,
            accuracy: thresholds::DEFAULT_ACCURACY,
            enter_pid_band: thresholds::DEFAULT_ENTER_PID_BAND,
            drop_ratio: thresholds::DEFAULT_DROP_RATIO,
            kick_ratio: thresholds::DEFAULT_KICK_RATIO,
            switch_off_ratio: thresholds::DEFAULT_SWITCH_OFF_RATIO,
            switch_off_hold: MillisDurationU32::millis(thresholds::DEFAULT_SWITCH_OFF_HOLD_MS),
            manual_timeout: MillisDurationU32::millis(thresholds::DEFAULT_MANUAL_TIMEOUT_MS),
            capture_hold: MillisDurationU32::millis(thresholds::DEFAULT_CAPTURE_HOLD_MS),
            fallback_duty: params::DEFAULT_FALLBACK_DUTY,
            kp: pid::DEFAULT_KP,
            ti: pid::DEFAULT_TI,
            td: pid::DEFAULT_TD,
            output_bounds: pid::OUTPUT_BOUNDS,
        }
    }
}
