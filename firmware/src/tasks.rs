//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod command;
pub mod governor;
pub mod led;

// タスク関数を再エクスポート
pub use command::command_task;
pub use governor::governor_task;
pub use led::led_task;
