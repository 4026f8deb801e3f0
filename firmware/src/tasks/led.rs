//! LED表示タスク
//!
//! LED1: 目標到達（hit）、LED2: MANUALモード、LED3: 停止検出。
//! LEDはアクティブLow。

use embassy_stm32::gpio::Output;

use crate::state::STATUS;

/// LED表示タスク
///
/// governorタスクが更新するたびに3つのLEDへ反映します。
#[embassy_executor::task]
pub async fn led_task(
    mut led_hit: Output<'static>,
    mut led_manual: Output<'static>,
    mut led_switch_off: Output<'static>,
) {
    info!("LED task started");

    loop {
        let status = STATUS.wait().await;
        set(&mut led_hit, status.hit);
        set(&mut led_manual, status.manual);
        set(&mut led_switch_off, status.switch_off);
    }
}

fn set(led: &mut Output<'static>, on: bool) {
    if on {
        led.set_low();
    } else {
        led.set_high();
    }
}
