//! ガバナコアの回復可能なエラー
//!
//! どれも致命的ではない。検出した場所で処理し、制御ループは安全なデューティを出し続ける。

use core::fmt;

/// コアのエラー型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// 保存先がないか不正。組み込みのデフォルトを使う
    CalibrationUnavailable,

    /// 要求された回転数の学習済みデューティがない
    NoCalibration,

    /// メモリ上のキャリブレーションは有効だが永続化に失敗した
    PersistenceWriteFailed,

    /// キャリブレーションテーブルが満杯
    CapacityExceeded,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CalibrationUnavailable => f.write_str("calibration store unavailable"),
            Error::NoCalibration => f.write_str("no calibration for speed"),
            Error::PersistenceWriteFailed => f.write_str("calibration write failed"),
            Error::CapacityExceeded => f.write_str("calibration table full"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
