//! タコメータ式速度ガバナ
//!
//! タコメータパルス入力1本でPWM駆動モータの回転数を計測し、
//! オープンループとPIDの2モードで速度を制御する。
//!
//! ```text
//! edges ─► EdgeCounter ─► FrequencyCounter ─► Governor ─► duty ─► PwmRange
//!                                               ▲  │
//!                                               │  ▼
//!                                       CalibrationStore ◄─► backend
//! ```
#![cfg_attr(not(test), no_std)]

// マクロのテキストスコープのため最初に宣言する
mod fmt;

pub mod actuator;
pub mod calibration;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod frequency;
pub mod pid;
pub mod speed;
pub mod telemetry;
pub mod ticks;

pub use actuator::PwmRange;
pub use calibration::{CalibrationBackend, CalibrationEntry, CalibrationStore};
pub use command::{Command, CommandError};
pub use config::GovernorConfig;
pub use control::{ControlMode, ControlOutput, Governor, StatusFlags};
pub use error::{Error, Result};
pub use frequency::{EdgeCounter, FrequencyCounter};
pub use pid::{Pid, PidComponents, PidGains};
pub use speed::TargetSpeed;
pub use ticks::{Clock, TickSpace};
