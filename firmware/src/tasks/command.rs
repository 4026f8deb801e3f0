//! コマンド受信タスク
//!
//! UARTから`key=value`行を受け取り、パースしてgovernorタスクへ送る。

use embassy_stm32::{mode::Async, usart::UartRx};
use heapless::String;
use tacho_governor::command;

use crate::config::uart::LINE_CAPACITY;
use crate::state::COMMANDS;

/// コマンド受信タスク
#[embassy_executor::task]
pub async fn command_task(mut rx: UartRx<'static, Async>) {
    info!("Command task started");

    let mut line: String<LINE_CAPACITY> = String::new();
    let mut buf = [0u8; 32];
    let mut overflow = false;

    loop {
        let n = match rx.read_until_idle(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("UART read error: {:?}", e);
                line.clear();
                continue;
            }
        };

        for &byte in &buf[..n] {
            match byte {
                b'\r' | b'\n' => {
                    if !overflow && !line.is_empty() {
                        dispatch(&line).await;
                    }
                    line.clear();
                    overflow = false;
                }
                _ => {
                    // 長すぎる行は改行まで読み捨て
                    if line.push(byte as char).is_err() {
                        overflow = true;
                    }
                }
            }
        }
    }
}

async fn dispatch(line: &str) {
    match command::parse(line) {
        Ok(cmd) => {
            debug!("Command received: {:?}", cmd);
            COMMANDS.send(cmd).await;
        }
        Err(e) => warn!("Invalid command {}: {:?}", line, e),
    }
}
