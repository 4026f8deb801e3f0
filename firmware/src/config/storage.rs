//! キャリブレーションページのレイアウト
//!
//! ```text
//! +0   magic   u32  "CAL1"
//! +4   version u16
//! +6   length  u16  テキスト長 [byte]
//! +8   crc32   u32  テキストのCRC32
//! +12  reserved u32
//! +16  "<speed>: <duty>\n" ...
//! ```

/// キャリブレーションデータのマジックナンバー（"CAL1"のASCII）
pub const CALIBRATION_MAGIC: u32 = 0x314C_4143;

/// 現在のレイアウトバージョン
pub const CALIBRATION_VERSION: u16 = 1;

/// ヘッダーサイズ（ダブルワード境界）
pub const HEADER_SIZE: usize = 16;

/// ページ先頭のヘッダー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageHeader {
    pub magic: u32,
    pub version: u16,
    pub length: u16,
    pub crc32: u32,
}

impl PageHeader {
    /// テキスト長とCRCからヘッダーを生成
    pub const fn new(length: u16, crc32: u32) -> Self {
        Self {
            magic: CALIBRATION_MAGIC,
            version: CALIBRATION_VERSION,
            length,
            crc32,
        }
    }

    /// リトルエンディアンでシリアライズ
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0xFFu8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.length.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.crc32.to_le_bytes());
        bytes
    }

    /// バイト列から復元
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
            crc32: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    /// マジックナンバーとバージョンを検証
    pub fn validate(&self) -> bool {
        self.magic == CALIBRATION_MAGIC && self.version == CALIBRATION_VERSION
    }
}

// コンパイル時サイズチェック（ページに収まることを確認）
const _: () = {
    const SIZE: usize = HEADER_SIZE + tacho_governor::calibration::TEXT_CAPACITY;
    assert!(
        SIZE <= super::params::flash::PAGE_SIZE as usize,
        "Calibration page exceeds flash page size"
    );
};
