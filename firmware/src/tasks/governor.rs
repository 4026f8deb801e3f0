//! 速度制御タスク
//!
//! タコメータ周波数を計測窓ごとに確定し、governorを1周期進めて
//! PWMデューティとステータスLEDへ反映する。
//! キャリブレーションを書き込んだ周期は、消去で止まった窓を捨てて計測をやり直す。

use embassy_futures::select::{select, Either};
use embassy_stm32::{peripherals, timer::simple_pwm::SimplePwm};
use embassy_time::Ticker;
use tacho_governor::config::pwm::{DEFAULT_HIGH, DEFAULT_LOW};
use tacho_governor::{Clock, FrequencyCounter, Governor, PwmRange, TickSpace};

use crate::clock::EmbassyClock;
use crate::config::{pwm, CONTROL_POLL_PERIOD};
use crate::eeprom::FlashBackend;
use crate::state::{COMMANDS, EDGES, STATUS};
use crate::tacho_tim;

/// `PwmRange`のコンペア値をタイマーのデューティに換算
///
/// # 引数
/// * `compare` - 0..=`pwm::RESOLUTION`のコンペア値
/// * `max_duty` - タイマーの最大デューティ
fn timer_duty(compare: u16, max_duty: u32) -> u32 {
    compare.min(pwm::RESOLUTION) as u32 * max_duty / pwm::RESOLUTION as u32
}

/// 速度制御タスク
#[embassy_executor::task]
pub async fn governor_task(
    mut governor: Governor<FlashBackend>,
    mut pwm: SimplePwm<'static, peripherals::TIM2>,
) {
    let clock = EmbassyClock;
    let range = PwmRange::new(DEFAULT_LOW, DEFAULT_HIGH);
    let mut counter =
        FrequencyCounter::new(governor.config().window, TickSpace::of::<EmbassyClock>());

    let mut ch = pwm.ch1();
    let max_duty = ch.max_duty_cycle() as u32;
    // 起動時は駆動オフ
    ch.set_duty_cycle(timer_duty(range.compare(0.0), max_duty) as u16);
    ch.enable();

    info!(
        "Governor task started: speed={} window={}ms",
        governor.speed().rpm(),
        governor.config().window.to_millis()
    );

    let mut ticker = Ticker::every(CONTROL_POLL_PERIOD);
    loop {
        match select(ticker.next(), COMMANDS.receive()).await {
            Either::First(()) => {
                tacho_tim::poll();
                let now_us = clock.now_us();
                let Some(freq) = counter.verify(&EDGES, now_us) else {
                    continue;
                };

                let output = governor.update(freq, now_us);
                if output.persisted {
                    // フラッシュ消去中はこのタスクが止まっていた
                    counter.reset();
                }
                ch.set_duty_cycle(timer_duty(range.compare(output.duty), max_duty) as u16);
                STATUS.signal(output.status);

                let line = output.telemetry();
                info!("{}", line.as_str());
            }
            Either::Second(cmd) => {
                governor.apply(cmd, clock.now_us());
            }
        }
    }
}
