//! オープンループ制御モード
//!
//! 停止状態からの始動と失速からの復帰。キャリブレーション済みデューティ、
//! または基準の半分以下なら全力キックで回す。

use super::{ControlMode, Governor, Step};
use crate::calibration::CalibrationBackend;

/// MANUALモードの1周期
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
    track_switch_off(gov, freq, now_us);

    if may_switch {
        // 目標付近に到達 → PIDへ
        if gov.relative_error(freq) < gov.config.enter_pid_band {
            return Step::Switch(ControlMode::Pid);
        }

        // 長時間収束しない → 学習値が古いとみなしてPIDに任せる
        let in_state = gov.elapsed_ms(gov.state_since, now_us);
        if in_state > gov.config.manual_timeout.ticks() && !gov.switch_off_detected {
            warn!(
                "Manual control did not converge in {}ms (freq={}Hz), handing over to PID",
                in_state, freq
            );
            return Step::Switch(ControlMode::Pid);
        }
    }

    if freq < gov.config.kick_ratio * gov.reference {
        return Step::Command(1.0);
    }

    Step::Command(calibrated_duty(gov))
}

fn calibrated_duty<B: CalibrationBackend>(gov: &Governor<B>) -> f32 {
    match gov.store.get(gov.speed) {
        Ok(duty) => duty,
        Err(_) => {
            debug!(
                "No calibration for speed {}, using fallback duty {}",
                gov.speed.rpm(),
                gov.config.fallback_duty
            );
            gov.config.fallback_duty
        }
    }
}

/// 停止（スイッチオフ）検出
///
/// 基準周波数の`switch_off_ratio`未満が`switch_off_hold`続いたら検出。
/// 回転が戻ったらタイマーを解除し、検出済みなら新しい始動とみなして
/// MANUALのタイムアウトをやり直す。
fn track_switch_off<B: CalibrationBackend>(gov: &mut Governor<B>, freq: f32, now_us: u32) {
    if freq < gov.config.switch_off_ratio * gov.reference {
        let since = *gov.switch_off_since.get_or_insert(now_us);
        if !gov.switch_off_detected
            && gov.elapsed_ms(since, now_us) >= gov.config.switch_off_hold.ticks()
        {
            gov.switch_off_detected = true;
            info!("Switch-off detected (freq={}Hz)", freq);
        }
    } else {
        gov.switch_off_since = None;
        if gov.switch_off_detected {
            gov.switch_off_detected = false;
            gov.state_since = now_us;
            info!("Rotation resumed, restarting manual timeout");
        }
    }
}
