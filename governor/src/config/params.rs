//! 制御パラメータ（デフォルト値）

use crate::speed::TargetSpeed;

/// 周波数測定窓 / 制御周期 [ms]
pub const DEFAULT_WINDOW_MS: u32 = 100;

/// タコメータ周波数 / 回転数 [Hz/RPM]（33 RPM ≈ 520 Hz）
pub const DEFAULT_HZ_PER_RPM: f32 = 520.0 / 33.0;

/// 起動時の目標回転数
pub const DEFAULT_SPEED: TargetSpeed = TargetSpeed::RPM_33;

/// キャリブレーションが無い場合のデューティ（全力で始動）
pub const DEFAULT_FALLBACK_DUTY: f32 = 1.0;

/// 組み込みキャリブレーション（保存データが読めない場合に使用）
pub const DEFAULT_CALIBRATION: &[(u16, f32)] = &[(33, 0.5), (45, 0.7)];

/// モード切替のしきい値（基準周波数に対する比率）
pub mod thresholds {
    /// 到達判定（hit）の相対誤差
    pub const DEFAULT_ACCURACY: f32 = 0.02;

    /// MANUAL → PID 切替の相対誤差
    pub const DEFAULT_ENTER_PID_BAND: f32 = 0.05;

    /// PID → MANUAL 切替（急な落ち込み）
    pub const DEFAULT_DROP_RATIO: f32 = 0.9;

    /// この比率以下では全力キック
    pub const DEFAULT_KICK_RATIO: f32 = 0.5;

    /// 停止（スイッチオフ）検出の比率
    pub const DEFAULT_SWITCH_OFF_RATIO: f32 = 0.1;

    /// 停止検出の確定時間 [ms]
    pub const DEFAULT_SWITCH_OFF_HOLD_MS: u32 = 1_000;

    /// MANUALで収束しない場合のタイムアウト [ms]
    pub const DEFAULT_MANUAL_TIMEOUT_MS: u32 = 10_000;

    /// キャリブレーション保存までの連続hit時間 [ms]
    pub const DEFAULT_CAPTURE_HOLD_MS: u32 = 2_000;
}

/// PIDゲイン（時定数表現: Ki = Kp/Ti, Kd = Kp*Td）
pub mod pid {
    pub const DEFAULT_KP: f32 = 0.002;
    /// 積分時間 [s]
    pub const DEFAULT_TI: f32 = 2.0;
    /// 微分時間 [s]
    pub const DEFAULT_TD: f32 = 0.0;

    /// 出力範囲（正規化デューティ）
    pub const OUTPUT_BOUNDS: (f32, f32) = (0.0, 1.0);
}

/// PWM設定
pub mod pwm {
    /// デューティ0のPWM値（反転駆動: 1024 = 停止）
    pub const DEFAULT_LOW: u16 = 1024;

    /// デューティ1のPWM値
    pub const DEFAULT_HIGH: u16 = 100;
}
