//! ボードとタスクの設定パラメータ
//!
//! 制御パラメータ（しきい値・PIDゲイン・キャリブレーション既定値）は
//! `tacho_governor::config`側にある。

use embassy_time::Duration;

/// 制御タスクのポーリング周期（計測窓の判定は`FrequencyCounter`が行う）
pub const CONTROL_POLL_PERIOD: Duration = Duration::from_millis(1);

/// PWM設定
pub mod pwm {
    use embassy_stm32::time::Hertz;

    /// PWM周波数（20kHz）
    pub const FREQUENCY: Hertz = Hertz(20_000);

    /// `PwmRange`のコンペア値の分解能（元基板の10bit PWMに合わせる）
    pub const RESOLUTION: u16 = 1024;
}

/// コマンドチャネル（UART）設定
pub mod uart {
    /// ボーレート
    pub const BAUDRATE: u32 = 115_200;

    /// 1行の最大長
    pub const LINE_CAPACITY: usize = 64;
}

/// キャリブレーション保存先フラッシュ
pub mod flash {
    /// STM32G431VBのフラッシュ先頭アドレス
    pub const BASE: u32 = 0x0800_0000;

    /// STM32G431VBのフラッシュページサイズ（2KB）
    pub const PAGE_SIZE: u32 = 2048;

    /// 最終ページ番号（ページ63、0ベース）
    pub const LAST_PAGE_NUMBER: u8 = 63;

    /// 最終ページのオフセット（128KB - 2KB）
    pub const CALIBRATION_OFFSET: u32 = 0x1F800;

    /// 最終ページの絶対アドレス（0x0801F800）
    pub const CALIBRATION_ADDRESS: u32 = BASE + CALIBRATION_OFFSET;

    /// フラッシュ書き込み単位（ダブルワード）
    pub const WRITE_SIZE: usize = 8;
}
