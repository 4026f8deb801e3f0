//! 目標回転数ごとの学習済みオープンループデューティ
//!
//! テーブルはメモリ上に持ち、[`CalibrationBackend`]を通して外部の保存先に反映する。
//! 保存形式は1行1エントリのテキスト:
//!
//! ```text
//! 33: 0.5200
//! 45: 0.7100
//! ```

use core::fmt::Write;

use heapless::{String, Vec};

use crate::error::{Error, Result};
use crate::speed::TargetSpeed;

/// 保存できるエントリの最大数
pub const MAX_ENTRIES: usize = 16;

/// 保存テキストの上限 [bytes]
pub const TEXT_CAPACITY: usize = 512;

/// 保存済みの値との差がこれ以下なら書き込みを省く
pub const DUTY_TOLERANCE: f32 = 0.005;

/// 学習済みの動作点1つ
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationEntry {
    pub speed: TargetSpeed,
    /// オープンループデューティ (0.0～1.0)
    pub duty: f32,
}

/// 永続化先 (ファイル、フラッシュページなど)
pub trait CalibrationBackend {
    type Error: core::fmt::Debug;

    /// 保存されたテキストを`buf`に読み、長さを返す
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error>;

    /// 保存されたテキストを置き換える
    fn write(&mut self, data: &[u8]) -> core::result::Result<(), Self::Error>;
}

/// テキスト形式を解析する。1行でも不正ならテキスト全体を拒否する
pub fn parse(text: &str) -> Result<Vec<CalibrationEntry, MAX_ENTRIES>> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (speed, duty) = line.split_once(':').ok_or(Error::CalibrationUnavailable)?;
        let speed: u16 = speed
            .trim()
            .parse()
            .map_err(|_| Error::CalibrationUnavailable)?;
        let duty: f32 = duty
            .trim()
            .parse()
            .map_err(|_| Error::CalibrationUnavailable)?;
        if !(0.0..=1.0).contains(&duty) {
            return Err(Error::CalibrationUnavailable);
        }
        upsert(&mut entries, TargetSpeed::new(speed), duty)
            .map_err(|_| Error::CalibrationUnavailable)?;
    }
    Ok(entries)
}

/// 回転数順を保って挿入する。既存エントリは上書き
fn upsert(
    entries: &mut Vec<CalibrationEntry, MAX_ENTRIES>,
    speed: TargetSpeed,
    duty: f32,
) -> Result<()> {
    match entries.binary_search_by(|e| e.speed.cmp(&speed)) {
        Ok(index) => {
            entries[index].duty = duty;
            Ok(())
        }
        Err(index) => entries
            .insert(index, CalibrationEntry { speed, duty })
            .map_err(|_| Error::CapacityExceeded),
    }
}

/// ライトスルーで永続化するメモリ上のキャリブレーションテーブル
pub struct CalibrationStore<B: CalibrationBackend> {
    backend: B,
    entries: Vec<CalibrationEntry, MAX_ENTRIES>,
    /// メモリの内容が保存先と一致している
    synced: bool,
}

impl<B: CalibrationBackend> CalibrationStore<B> {
    /// `backend`の上に空のテーブルを作る。[`load`](Self::load)で読み込む
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            entries: Vec::new(),
            synced: false,
        }
    }

    /// 保存先の内容でテーブルを置き換える
    ///
    /// # 戻り値
    /// * `Err(CalibrationUnavailable)` - 保存先がないか不正。テーブルは変更しない
    pub fn load(&mut self) -> Result<()> {
        let mut buf = [0u8; TEXT_CAPACITY];
        let len = match self.backend.read(&mut buf) {
            Ok(len) if len <= buf.len() => len,
            Ok(_) | Err(_) => return Err(Error::CalibrationUnavailable),
        };
        let text = core::str::from_utf8(&buf[..len]).map_err(|_| Error::CalibrationUnavailable)?;
        self.entries = parse(text)?;
        self.synced = true;
        info!("Calibration loaded: {} entries", self.entries.len());
        Ok(())
    }

    /// 組み込みの値でテーブルを置き換える (保存はしない)
    pub fn load_defaults(&mut self, defaults: &[(u16, f32)]) {
        self.entries.clear();
        self.synced = false;
        for &(speed, duty) in defaults {
            if upsert(&mut self.entries, TargetSpeed::new(speed), duty.clamp(0.0, 1.0)).is_err() {
                warn!("Default calibration table truncated at {} entries", MAX_ENTRIES);
                break;
            }
        }
    }

    /// 保存先から読み込み、失敗したら`defaults`を使う
    ///
    /// # 戻り値
    /// 保存先の内容を使ったら`true`
    pub fn load_or_defaults(&mut self, defaults: &[(u16, f32)]) -> bool {
        match self.load() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to load calibration: {:?}, using built-in defaults", e);
                self.load_defaults(defaults);
                false
            }
        }
    }

    /// `speed`の学習済みデューティ
    pub fn get(&self, speed: TargetSpeed) -> Result<f32> {
        self.entries
            .binary_search_by(|e| e.speed.cmp(&speed))
            .map(|index| self.entries[index].duty)
            .map_err(|_| Error::NoCalibration)
    }

    /// `speed`のデューティを`duty`にして同期的に保存する
    ///
    /// 保存済みの値と[`DUTY_TOLERANCE`]以内なら何もしない。
    /// フラッシュの消去は計数を止めるので、同じ値の書き直しは避ける。
    ///
    /// # 戻り値
    /// * `Ok(true)` - 保存先に書き込んだ
    /// * `Ok(false)` - 保存済みの値と同じなので書き込まなかった
    /// * `Err(PersistenceWriteFailed)` - メモリは更新したが書き込みに失敗した
    /// * `Err(CapacityExceeded)` - テーブルが満杯。何も変更しない
    pub fn set(&mut self, speed: TargetSpeed, duty: f32) -> Result<bool> {
        let duty = duty.clamp(0.0, 1.0);
        if self.synced {
            if let Ok(stored) = self.get(speed) {
                if libm::fabsf(stored - duty) <= DUTY_TOLERANCE {
                    debug!("Calibration unchanged: speed={} duty={}", speed.rpm(), stored);
                    return Ok(false);
                }
            }
        }

        upsert(&mut self.entries, speed, duty)?;
        info!("Calibration captured: speed={} duty={}", speed.rpm(), duty);

        let text = self.serialize();
        if self.backend.write(text.as_bytes()).is_err() {
            self.synced = false;
            error!("Failed to persist calibration for speed {}", speed.rpm());
            return Err(Error::PersistenceWriteFailed);
        }
        self.synced = true;
        Ok(true)
    }

    /// テーブルをテキスト形式にする
    pub fn serialize(&self) -> String<TEXT_CAPACITY> {
        let mut text = String::new();
        for entry in &self.entries {
            // 1行は最長14バイト ("65535: 1.0000\n")、MAX_ENTRIES行でもTEXT_CAPACITYに収まる
            let _ = writeln!(text, "{}: {:.4}", entry.speed.rpm(), entry.duty);
        }
        text
    }

    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
