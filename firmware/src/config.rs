//! Configuration module
//!
//! ボード固有の設定パラメータと、キャリブレーションページの
//! フラッシュ上のレイアウトを提供します。

pub mod params;
pub mod storage;

// params.rsから主要な定数を再エクスポート
pub use params::*;

// storage.rsからページレイアウトを再エクスポート
pub use storage::PageHeader;
