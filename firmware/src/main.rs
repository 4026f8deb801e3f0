#![no_std]
#![no_main]

// マクロのテキストスコープのため最初に宣言する
mod fmt;

mod clock;
mod config;
mod eeprom;
mod hardware;
mod state;
mod tacho_tim;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    crc::{Config as CrcConfig, Crc},
    flash::Flash,
    gpio::{Level, OutputType, Output, Speed},
    timer::{low_level::CountingMode, simple_pwm::{PwmPin, SimplePwm}},
    usart::{Config as UartConfig, UartRx},
};
use embassy_time::{Duration, Timer};
use tacho_governor::config::{DEFAULT_CALIBRATION, DEFAULT_SPEED};
use tacho_governor::{CalibrationStore, Clock, Governor, GovernorConfig, TickSpace};

use clock::EmbassyClock;
use eeprom::FlashBackend;
use hardware::Irqs;
use tasks::{command_task, governor_task, led_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("═══════════════════════════════════════════════");
    info!("   Tachometer speed governor • STM32G431VB @ 170MHz");
    info!("═══════════════════════════════════════════════");

    // フラッシュとCRC初期化（キャリブレーション保存用）
    let flash = Flash::new_blocking(p.FLASH);

    // CRC初期化（STM32デフォルト設定: CRC-32、poly=0x04C11DB7）
    let crc_config = CrcConfig::new(
        embassy_stm32::crc::InputReverseConfig::None,
        false, // reverse_out
        embassy_stm32::crc::PolySize::Width32,
        0xFFFFFFFF, // crc_init_value
        0x04C11DB7, // crc_poly (CRC-32)
    )
    .unwrap();
    let crc = Crc::new(p.CRC, crc_config);

    // キャリブレーションをフラッシュから読み込み（失敗時は組み込み既定値）
    info!("Loading calibration from flash...");
    let mut store = CalibrationStore::new(FlashBackend::new(flash, crc));
    if !store.load_or_defaults(DEFAULT_CALIBRATION) {
        info!("Using built-in calibration defaults");
    }
    for entry in store.entries() {
        info!("  speed {}: duty {}", entry.speed.rpm(), entry.duty);
    }

    let clock = EmbassyClock;
    let governor = Governor::new(
        GovernorConfig::default(),
        TickSpace::of::<EmbassyClock>(),
        store,
        DEFAULT_SPEED,
        clock.now_us(),
    );

    // LED初期化＆タスク起動（アクティブLow、初期は消灯）
    let led_hit = Output::new(p.PC13, Level::High, Speed::Low);
    let led_manual = Output::new(p.PC14, Level::High, Speed::Low);
    let led_switch_off = Output::new(p.PC15, Level::High, Speed::Low);
    spawner
        .spawn(led_task(led_hit, led_manual, led_switch_off))
        .unwrap();

    // タコメータ入力（PB6 = TIM4_CH1、ハードウェアでエッジを計数）
    unsafe {
        tacho_tim::init_tacho_timer();
    }
    info!("TIM4 tacho counter initialized");

    // コマンドUART（USART2 RX = PA3）
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = config::uart::BAUDRATE;
    let uart_rx = UartRx::new(p.USART2, Irqs, p.PA3, p.DMA1_CH1, uart_config).unwrap();
    spawner.spawn(command_task(uart_rx)).unwrap();

    // PWM初期化（TIM2 CH1 = PA0）
    let pwm = SimplePwm::new(
        p.TIM2,
        Some(PwmPin::new(p.PA0, OutputType::PushPull)),
        None,
        None,
        None,
        config::pwm::FREQUENCY,
        CountingMode::EdgeAlignedUp,
    );

    info!("Starting speed control...");
    spawner.spawn(governor_task(governor, pwm)).unwrap();

    // メインループ（将来の拡張用）
    loop {
        Timer::after(Duration::from_millis(1000)).await;
    }
}
