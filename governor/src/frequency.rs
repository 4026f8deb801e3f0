//! タコメータ周波数の計測
//!
//! エッジ割り込みやハードウェアカウンタはアトミックなカウンタを進めるだけ
//! ([`EdgeCounter::on_edge`], [`EdgeCounter::add`])。
//! 制御ループは[`FrequencyCounter::verify`]を周期的に呼び、窓が経過したら
//! カウントを取り出してクリアし、周波数に変換する。
//!
//! ```text
//!  立ち上がりエッジ ──► EdgeCounter (AtomicU32) ──take()──► FrequencyCounter ──► Hz
//!  (割り込み / タイマ)                                      (制御ループ)
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use fugit::MicrosDurationU32;

use crate::ticks::TickSpace;

/// 割り込み側のパルスカウンタ
///
/// 加算と取り出しはそれぞれ単一のアトミック操作。リセットをまたいでも
/// エッジの欠落や二重計数は起きない。
pub struct EdgeCounter {
    count: AtomicU32,
}

impl EdgeCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// 立ち上がりエッジを1つ記録する (割り込みコンテキスト)
    #[inline(always)]
    pub fn on_edge(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// ハードウェアカウンタで数えた`n`エッジをまとめて記録する
    #[inline(always)]
    pub fn add(&self, n: u32) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// リセットせずに現在のカウントを読む
    #[inline(always)]
    pub fn peek(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// カウントをアトミックに読み出してクリアする
    #[inline(always)]
    pub fn take(&self) -> u32 {
        self.count.swap(0, Ordering::AcqRel)
    }
}

impl Default for EdgeCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 窓内のエッジ数を周波数に変換する (制御ループ側)
pub struct FrequencyCounter {
    window: MicrosDurationU32,
    ticks: TickSpace,
    window_start: Option<u32>,
}

impl FrequencyCounter {
    /// # 引数
    /// * `window` - 測定窓の長さ（制御周期と同じ）
    /// * `ticks` - クロックのカウンタ幅
    pub fn new(window: MicrosDurationU32, ticks: TickSpace) -> Self {
        Self {
            window,
            ticks,
            window_start: None,
        }
    }

    /// `now_us`の時点でカウンタを確認する
    ///
    /// 前回のリセットから窓1つ分以上経過していれば周波数 [Hz] を返し、
    /// そうでなければ`None`。最初の呼び出しは窓を開始するだけ。
    /// エッジのない窓は`Some(0.0)`になる。
    pub fn verify(&mut self, edges: &EdgeCounter, now_us: u32) -> Option<f32> {
        let Some(start) = self.window_start else {
            // 最初の窓の開始前のエッジは破棄
            edges.take();
            self.window_start = Some(now_us);
            debug!("Frequency window armed at {}us", now_us);
            return None;
        };

        let elapsed = self.ticks.diff(now_us, start);
        if elapsed < 0 || (elapsed as u32) < self.window.ticks() {
            return None;
        }

        let count = edges.take();
        self.window_start = Some(now_us);

        let freq = count as f32 * 1_000_000.0 / elapsed as f32;
        trace!("{} edges in {}us -> {} Hz", count, elapsed, freq);
        Some(freq)
    }

    /// 計測をやり直す。次の`verify`で新しい窓を開始し、それまでのエッジは捨てる
    ///
    /// フラッシュ書き込みなどで計数が止まった窓を捨てるのに使う。
    pub fn reset(&mut self) {
        self.window_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> FrequencyCounter {
        FrequencyCounter::new(MicrosDurationU32::millis(100), TickSpace::FULL)
    }

    fn feed(edges: &EdgeCounter, n: u32) {
        for _ in 0..n {
            edges.on_edge();
        }
    }

    #[test]
    fn test_first_verify_only_arms() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        feed(&edges, 10);
        assert_eq!(freq.verify(&edges, 5_000_000), None);
        assert_eq!(edges.peek(), 0);
        // 2回目からは開始時刻を基準に窓を測る
        assert_eq!(freq.verify(&edges, 5_050_000), None);
        assert_eq!(freq.verify(&edges, 5_100_000), Some(0.0));
    }

    #[test]
    fn test_frequency_is_edges_per_elapsed() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        let start = 1_000_000;

        for (n, elapsed) in [(52u32, 100_000u32), (1, 100_000), (333, 123_456), (7, 250_000)] {
            freq.reset();
            freq.verify(&edges, start);
            feed(&edges, n);
            let sample = freq.verify(&edges, start + elapsed).unwrap();
            let expected = n as f32 * 1e6 / elapsed as f32;
            assert!((sample - expected).abs() < 1e-3, "n={n} elapsed={elapsed}");
        }
    }

    #[test]
    fn test_verify_before_window_never_emits() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        freq.verify(&edges, 0);
        feed(&edges, 20);
        for t in [1, 10_000, 50_000, 99_999] {
            assert_eq!(freq.verify(&edges, t), None);
        }
        // 早すぎる呼び出しはカウンタを消費しない
        assert_eq!(edges.peek(), 20);
        assert_eq!(freq.verify(&edges, 100_000), Some(200.0));
    }

    #[test]
    fn test_silent_window_yields_zero() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        freq.verify(&edges, 0);
        assert_eq!(freq.verify(&edges, 100_000), Some(0.0));
    }

    #[test]
    fn test_window_across_counter_wrap() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        let start = u32::MAX - 40_000;
        freq.verify(&edges, start);
        feed(&edges, 10);
        let sample = freq.verify(&edges, start.wrapping_add(100_000)).unwrap();
        assert!((sample - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_window_restarts_after_sample() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        freq.verify(&edges, 0);
        feed(&edges, 10);
        assert!(freq.verify(&edges, 100_000).is_some());
        feed(&edges, 5);
        assert_eq!(freq.verify(&edges, 150_000), None);
        let sample = freq.verify(&edges, 200_000).unwrap();
        assert!((sample - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_add_counts_hardware_batches() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        freq.verify(&edges, 0);
        edges.add(30);
        edges.on_edge();
        edges.add(21);
        assert_eq!(freq.verify(&edges, 100_000), Some(520.0));
    }

    #[test]
    fn test_reset_discards_stalled_window() {
        let edges = EdgeCounter::new();
        let mut freq = counter();
        freq.verify(&edges, 0);
        // 窓の途中で計数が止まった (フラッシュ消去中など)
        feed(&edges, 41);
        freq.reset();
        assert_eq!(freq.verify(&edges, 80_000), None);
        assert_eq!(edges.peek(), 0);
        feed(&edges, 52);
        let sample = freq.verify(&edges, 180_000).unwrap();
        assert!((sample - 520.0).abs() < 1e-3);
    }
}
