//! embassy-timeベースのティック

use embassy_time::Instant;
use tacho_governor::Clock;

/// 起動からのマイクロ秒（32bitで折り返す）
#[derive(Clone, Copy)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_us(&self) -> u32 {
        Instant::now().as_micros() as u32
    }
}
