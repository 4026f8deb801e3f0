//! PID制御モード
//!
//! 目標周波数をPIDで維持し、一定時間目標に留まったらそのデューティを
//! キャリブレーションとして保存する。

use super::{ControlMode, Governor, Step};
use crate::calibration::CalibrationBackend;
use crate::error::Error;

/// PIDモードの1周期
///
/// # 引数
/// * `freq` - 測定周波数 [Hz]
/// * `now_us` - 現在のティック
/// * `may_switch` - この呼び出しでモード遷移してよいか
pub(super) fn execute<B: CalibrationBackend>(
    gov: &mut Governor<B>,
    freq: f32,
    now_us: u32,
    may_switch: bool,
) -> Step {
    // 急な落ち込み（負荷・失速）→ MANUALへ
    if may_switch && freq < gov.config.drop_ratio * gov.reference {
        info!(
            "Frequency dropped to {}Hz (reference {}Hz)",
            freq, gov.reference
        );
        return Step::Switch(ControlMode::Manual);
    }

    let duty = gov.pid.compute(freq);
    capture(gov, duty, now_us);
    Step::Command(duty)
}

/// 連続hitが`capture_hold`続いたら、このPID区間で一度だけ保存する
fn capture<B: CalibrationBackend>(gov: &mut Governor<B>, duty: f32, now_us: u32) {
    if !gov.hit {
        gov.hit_since = None;
        return;
    }

    let since = *gov.hit_since.get_or_insert(now_us);
    if gov.captured || gov.elapsed_ms(since, now_us) < gov.config.capture_hold.ticks() {
        return;
    }

    gov.captured = true;
    let speed = gov.speed;
    match gov.store.set(speed, duty) {
        Ok(written) => gov.persisted = written,
        Err(Error::PersistenceWriteFailed) => {
            // 書き込みは試みたので計数は止まった可能性がある
            // メモリ上の値は有効なので運転は継続
            gov.persisted = true;
            warn!("Calibration not persisted for speed {}", speed.rpm());
        }
        Err(e) => warn!("Calibration not captured: {:?}", e),
    }
}
