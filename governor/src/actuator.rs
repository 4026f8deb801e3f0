//! デューティ指令からPWM比較値への変換

/// プラットフォームのPWM範囲
///
/// `low`がデューティ0、`high`がデューティ1の比較値。
/// `low > high`なら反転ドライブ段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmRange {
    pub low: u16,
    pub high: u16,
}

impl PwmRange {
    pub const fn new(low: u16, high: u16) -> Self {
        Self { low, high }
    }

    /// 正規化指令のPWM比較値。指令は0.0～1.0にクランプ
    pub fn compare(&self, command: f32) -> u16 {
        let command = if command.is_nan() { 0.0 } else { command.clamp(0.0, 1.0) };
        let low = self.low as f32;
        let value = low + command * (self.high as f32 - low);
        libm::roundf(value) as u16
    }

    /// `compare`に対応する正規化指令 ([`compare`](Self::compare)の逆変換)
    pub fn command(&self, compare: u16) -> f32 {
        if self.low == self.high {
            return 0.0;
        }
        let low = self.low as f32;
        ((compare as f32 - low) / (self.high as f32 - low)).clamp(0.0, 1.0)
    }
}
