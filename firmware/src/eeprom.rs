//! フラッシュメモリベースのキャリブレーション保存
//!
//! STM32G431VBの最終フラッシュページ（ページ63）にキャリブレーション
//! テキストを保存する。

use embassy_stm32::{
    crc::Crc,
    flash::{Blocking, Flash},
};
use tacho_governor::calibration::TEXT_CAPACITY;
use tacho_governor::CalibrationBackend;

use crate::config::flash::{
    CALIBRATION_ADDRESS, CALIBRATION_OFFSET, LAST_PAGE_NUMBER, PAGE_SIZE, WRITE_SIZE,
};
use crate::config::storage::HEADER_SIZE;
use crate::config::PageHeader;

/// フラッシュ操作のエラー型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// フラッシュ書き込みエラー
    FlashWriteError,

    /// フラッシュ消去エラー
    FlashEraseError,

    /// フラッシュ読み取りエラー
    FlashReadError,

    /// CRC検証エラー
    CrcMismatch,

    /// マジックナンバー/バージョン不一致（未書き込みページを含む）
    InvalidHeader,

    /// データサイズエラー
    InvalidSize,
}

/// 最終ページを使う`CalibrationBackend`
pub struct FlashBackend {
    flash: Flash<'static, Blocking>,
    crc: Crc<'static>,
}

impl FlashBackend {
    pub fn new(flash: Flash<'static, Blocking>, crc: Crc<'static>) -> Self {
        Self { flash, crc }
    }

    fn checksum(&mut self, data: &[u8]) -> u32 {
        self.crc.reset();
        self.crc.feed_bytes(data)
    }
}

impl CalibrationBackend for FlashBackend {
    type Error = FlashError;

    /// ページからキャリブレーションテキストを読み込む
    ///
    /// # 戻り値
    /// * `Ok(len)` - `buf[..len]`にテキスト
    /// * `Err(FlashError)` - 未書き込み・破損など
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FlashError> {
        info!("Reading calibration from flash at 0x{:08X}", CALIBRATION_ADDRESS);

        let mut raw = [0u8; HEADER_SIZE];
        self.flash
            .blocking_read(CALIBRATION_OFFSET, &mut raw)
            .map_err(|_| FlashError::FlashReadError)?;

        let header = PageHeader::from_bytes(&raw);
        if !header.validate() {
            warn!(
                "Calibration header invalid: magic=0x{:08X}, version={}",
                header.magic, header.version
            );
            return Err(FlashError::InvalidHeader);
        }

        let len = header.length as usize;
        if len > TEXT_CAPACITY || len > buf.len() {
            error!("Calibration length out of range: {}", len);
            return Err(FlashError::InvalidSize);
        }

        self.flash
            .blocking_read(CALIBRATION_OFFSET + HEADER_SIZE as u32, &mut buf[..len])
            .map_err(|_| FlashError::FlashReadError)?;

        let crc = self.checksum(&buf[..len]);
        if crc != header.crc32 {
            error!(
                "CRC verification failed: stored=0x{:08X}, calculated=0x{:08X}",
                header.crc32, crc
            );
            return Err(FlashError::CrcMismatch);
        }

        info!("Calibration loaded: {} bytes", len);
        Ok(len)
    }

    /// ページを消去してテキストを書き込む
    fn write(&mut self, data: &[u8]) -> Result<(), FlashError> {
        if data.len() > TEXT_CAPACITY {
            return Err(FlashError::InvalidSize);
        }

        let mut page = [0xFFu8; HEADER_SIZE + TEXT_CAPACITY];
        let header = PageHeader::new(data.len() as u16, self.checksum(data));
        page[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        page[HEADER_SIZE..HEADER_SIZE + data.len()].copy_from_slice(data);

        // ダブルワード単位に切り上げ
        let size = (HEADER_SIZE + data.len()).div_ceil(WRITE_SIZE) * WRITE_SIZE;

        info!("Erasing flash page {}", LAST_PAGE_NUMBER);
        self.flash
            .blocking_erase(CALIBRATION_OFFSET, CALIBRATION_OFFSET + PAGE_SIZE)
            .map_err(|e| {
                error!("Flash erase failed: {:?}", e);
                FlashError::FlashEraseError
            })?;

        info!("Writing {} bytes to flash", size);
        self.flash
            .blocking_write(CALIBRATION_OFFSET, &page[..size])
            .map_err(|e| {
                error!("Flash write failed: {:?}", e);
                FlashError::FlashWriteError
            })?;

        info!("Calibration saved (CRC32 0x{:08X})", header.crc32);
        Ok(())
    }
}
