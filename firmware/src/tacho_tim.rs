//! TIM4ベースのタコメータパルスカウンタ
//!
//! TIM4を外部クロックモード1で動かし、タコメータの立ち上がりエッジで
//! CNTを進める。計数はハードウェアだけで行うので、フラッシュ消去などで
//! CPUが止まってもエッジは失われない。
//!
//! ## ハードウェア構成
//! - TIM4_CH1 (PB6): タコメータ入力
//!
//! ## 動作原理
//! 1. TI1をフィルタしてTI1FP1をトリガーに選択する（SMCR.TS=TI1FP1）
//! 2. トリガーの立ち上がりでカウンタを進める（SMCR.SMS=EXT_CLOCK_MODE）
//! 3. 制御タスクが[`poll`]で16bit CNTの差分を読み、`EDGES`に加算する

use core::sync::atomic::{AtomicU32, Ordering};
use embassy_stm32::pac;

use crate::state::EDGES;

/// 前回`poll`時のCNT
static LAST_COUNT: AtomicU32 = AtomicU32::new(0);

/// TIM4 外部クロックカウンタの初期化
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_tacho_timer() {
    let rcc = pac::RCC;
    let tim4 = pac::TIM4;
    let gpiob = pac::GPIOB;

    // 1. クロック有効化
    rcc.ahb2enr().modify(|w| w.set_gpioben(true)); // GPIOB
    rcc.apb1enr1().modify(|w| w.set_tim4en(true)); // TIM4

    // 2. PB6をAF2 (TIM4_CH1) に設定、停止時にLowで安定するようプルダウン
    gpiob
        .moder()
        .modify(|w| w.set_moder(6, pac::gpio::vals::Moder::ALTERNATE));
    gpiob.afr(0).modify(|w| w.set_afr(6, 2)); // AF2 (AFR[0] = AFRL)
    gpiob
        .pupdr()
        .modify(|w| w.set_pupdr(6, pac::gpio::vals::Pupdr::PULL_DOWN));

    // 3. TIM4設定
    tim4.cr1().modify(|w| w.set_cen(false));
    tim4.psc().write_value(0); // 1エッジ = 1カウント
    tim4.arr().write_value(pac::timer::regs::ArrCore(0xFFFF));

    // 4. CH1入力: CC1S=01 (IC1 -> TI1)、8サイクルフィルタ
    // PAC上の名前はTI4だが、CH1では自チャネル入力を意味する
    tim4.ccmr_input(0).modify(|w| {
        w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TI4);
        w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8);
    });

    // 5. 立ち上がりエッジのみ（CC1P=0, CC1NP=0）
    tim4.ccer().modify(|w| {
        w.set_ccp(0, false);
        w.set_ccnp(0, false);
    });

    // 6. 外部クロックモード1: TI1FP1の立ち上がりでカウント
    tim4.smcr().modify(|w| {
        w.set_ts(pac::timer::vals::Ts::TI1FP1);
        w.set_sms(pac::timer::vals::Sms::EXT_CLOCK_MODE);
    });

    // 7. カウンタをリセットしてタイマー開始
    tim4.cnt().write_value(pac::timer::regs::CntCore(0)); // CNT = 0
    tim4.sr().write(|w| w.0 = 0); // ステータスフラグクリア
    tim4.egr().write(|w| w.set_ug(true)); // Update生成（プリスケーラ反映）
    LAST_COUNT.store(0, Ordering::Relaxed);

    tim4.cr1().modify(|w| w.set_cen(true));
}

/// 前回呼び出しからのエッジ数を`EDGES`に加算する
///
/// CNTは16bitなので、呼び出し間隔は65535エッジ分より短くすること
/// (基準周波数520Hzで約2分)。
#[inline(always)]
pub fn poll() {
    let count = pac::TIM4.cnt().read().cnt() as u32;
    let last = LAST_COUNT.swap(count, Ordering::Relaxed);
    EDGES.add(count.wrapping_sub(last) & 0xFFFF);
}
