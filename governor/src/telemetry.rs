//! 行単位のテレメトリ
//!
//! 制御更新ごとに1行出力し、プロットツールが読む:
//!
//! ```text
//! <t [s]>, <duty>, <freq [Hz]>, <MANUAL|PID>[, <P>, <I>, <D>]
//! ```
//!
//! 新しいフィールドは末尾にのみ追加する。

use core::fmt::Write;

use heapless::String;

use crate::control::ControlOutput;

pub const LINE_CAPACITY: usize = 128;

pub type TelemetryLine = String<LINE_CAPACITY>;

/// テレメトリを1行に整形する (改行なし)
pub fn format_line(output: &ControlOutput) -> TelemetryLine {
    let mut line = TelemetryLine::new();
    let seconds = output.uptime_us as f64 / 1_000_000.0;
    // LINE_CAPACITYは最長の行より大きい
    let _ = write!(
        line,
        "{:.3}, {:.4}, {:.2}, {}",
        seconds,
        output.duty,
        output.freq,
        output.mode.label()
    );
    if let Some(c) = output.components {
        let _ = write!(line, ", {:.5}, {:.5}, {:.5}", c.p, c.i, c.d);
    }
    line
}

impl ControlOutput {
    /// この更新のテレメトリ行
    pub fn telemetry(&self) -> TelemetryLine {
        format_line(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlMode, StatusFlags};
    use crate::pid::PidComponents;

    fn output(mode: ControlMode, components: Option<PidComponents>) -> ControlOutput {
        ControlOutput {
            uptime_us: 12_345_678,
            duty: 0.5,
            freq: 519.876,
            mode,
            status: StatusFlags::default(),
            components,
            persisted: false,
        }
    }

    #[test]
    fn test_manual_line() {
        let line = format_line(&output(ControlMode::Manual, None));
        assert_eq!(line.as_str(), "12.346, 0.5000, 519.88, MANUAL");
    }

    #[test]
    fn test_pid_line_appends_components() {
        let components = PidComponents {
            p: 0.01,
            i: 0.49,
            d: 0.0,
        };
        let line = format_line(&output(ControlMode::Pid, Some(components)));
        assert_eq!(
            line.as_str(),
            "12.346, 0.5000, 519.88, PID, 0.01000, 0.49000, 0.00000"
        );
    }
}
