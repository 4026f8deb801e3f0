//! 設定モジュール
//!
//! デフォルトパラメータとガバナの実行時設定

pub mod params;
pub mod settings;

pub use params::*;
pub use settings::GovernorConfig;
