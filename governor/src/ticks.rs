//! ラップアラウンド安全なティック演算
//!
//! プラットフォームのカウンタはフリーランでビット幅ごとにラップする。
//! 経過時間の計算はすべて[`TickSpace::diff`]を通し、2回の読み取りの間の
//! オーバーフローを呼び出し側から隠す。

/// プラットフォームが提供する単調増加のマイクロ秒クロック
pub trait Clock {
    /// カウンタのビット幅 (1..=32)
    const BITS: u32 = 32;

    /// 現在のカウンタ値 [μs]、`2^BITS`でラップ
    fn now_us(&self) -> u32;
}

/// 指定ビット幅のカウンタ値空間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickSpace {
    bits: u32,
}

impl TickSpace {
    /// 32ビットカウンタ
    pub const FULL: Self = Self { bits: 32 };

    /// `bits`幅のカウンタ空間、1..=32にクランプ
    pub const fn new(bits: u32) -> Self {
        let bits = if bits == 0 {
            1
        } else if bits > 32 {
            32
        } else {
            bits
        };
        Self { bits }
    }

    /// クロックに合わせたカウンタ空間
    pub const fn of<C: Clock>() -> Self {
        Self::new(C::BITS)
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }

    fn period(&self) -> u64 {
        1u64 << self.bits
    }

    /// 任意の値をカウンタ空間に収める
    pub fn wrap(&self, value: u64) -> u32 {
        (value & (self.period() - 1)) as u32
    }

    /// ティックに`delta`を足す。ハードウェアカウンタと同様にラップする
    pub fn add(&self, tick: u32, delta: u32) -> u32 {
        self.wrap(tick as u64 + delta as u64)
    }

    /// `start`から`end`までの符号付き経過ティック
    ///
    /// 実際の間隔がカウンタ周期の半分未満なら正確。
    pub fn diff(&self, end: u32, start: u32) -> i32 {
        let period = self.period();
        let half = period / 2;
        let raw = (end as u64).wrapping_sub(start as u64).wrapping_add(half) & (period - 1);
        (raw as i64 - half as i64) as i32
    }
}

impl Default for TickSpace {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_without_wrap() {
        let ticks = TickSpace::FULL;
        assert_eq!(ticks.diff(1_500, 1_000), 500);
        assert_eq!(ticks.diff(1_000, 1_500), -500);
    }

    #[test]
    fn test_diff_across_full_width_overflow() {
        let ticks = TickSpace::FULL;
        let start = u32::MAX - 99;
        let end = start.wrapping_add(250);
        assert_eq!(ticks.diff(end, start), 250);
    }

    #[test]
    fn test_diff_matches_unwrapped_elapsed_on_small_counter() {
        // 8ビットカウンタ: 256でラップ
        let ticks = TickSpace::new(8);
        for start in 0..256u64 {
            for elapsed in [0u64, 1, 17, 100, 127] {
                let a = ticks.wrap(start);
                let b = ticks.wrap(start + elapsed);
                assert_eq!(ticks.diff(b, a), elapsed as i32, "start={start} elapsed={elapsed}");
            }
        }
    }

    #[test]
    fn test_add_wraps() {
        let ticks = TickSpace::new(8);
        assert_eq!(ticks.add(250, 10), 4);
        assert_eq!(ticks.diff(ticks.add(250, 10), 250), 10);
    }

    #[test]
    fn test_width_is_clamped() {
        assert_eq!(TickSpace::new(0).bits(), 1);
        assert_eq!(TickSpace::new(64).bits(), 32);
    }
}
