//! グローバル共有状態
//!
//! 割り込み側とタスク間で共有するものだけを置く。制御状態そのものは
//! governorタスクが所有する。

use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use tacho_governor::{Command, EdgeCounter, StatusFlags};

/// タコメータの立ち上がりエッジ数（TIM4のCNT差分を加算）
pub static EDGES: EdgeCounter = EdgeCounter::new();

/// LED表示用の最新ステータス
pub static STATUS: Signal<ThreadModeRawMutex, StatusFlags> = Signal::new();

/// UARTから受信したコマンド
pub static COMMANDS: Channel<ThreadModeRawMutex, Command, 4> = Channel::new();
