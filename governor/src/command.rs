//! コマンドチャネルの解析
//!
//! 実行中のパラメータを変更する`key=value`形式の行:
//!
//! | キー | 値 | 効果 |
//! |---|---|---|
//! | `Kp` | f32 | 比例ゲイン |
//! | `Ti` | f32 | 積分時間 [s] |
//! | `Td` | f32 | 微分時間 [s] |
//! | `speed` | u16 | 目標回転数 [RPM] |

use core::fmt;

use crate::speed::TargetSpeed;

/// 解析済みコマンド
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Kp(f32),
    Ti(f32),
    Td(f32),
    Speed(TargetSpeed),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// 行に`=`がない
    Syntax,
    UnknownKey,
    InvalidValue,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Syntax => f.write_str("expected key=value"),
            CommandError::UnknownKey => f.write_str("unknown key"),
            CommandError::InvalidValue => f.write_str("invalid value"),
        }
    }
}

/// コマンド1行を解析する
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let (key, value) = line.trim().split_once('=').ok_or(CommandError::Syntax)?;
    let value = value.trim();
    match key.trim() {
        "Kp" => parse_gain(value).map(Command::Kp),
        "Ti" => parse_gain(value).map(Command::Ti),
        "Td" => parse_gain(value).map(Command::Td),
        "speed" => value
            .parse::<u16>()
            .map(|rpm| Command::Speed(TargetSpeed::new(rpm)))
            .map_err(|_| CommandError::InvalidValue),
        _ => Err(CommandError::UnknownKey),
    }
}

fn parse_gain(value: &str) -> Result<f32, CommandError> {
    match value.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CommandError::InvalidValue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gains() {
        assert_eq!(parse("Kp=-0.0002"), Ok(Command::Kp(-0.0002)));
        assert_eq!(parse("Ti=2\n"), Ok(Command::Ti(2.0)));
        assert_eq!(parse(" Td = 0.5 "), Ok(Command::Td(0.5)));
    }

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse("speed=45"), Ok(Command::Speed(TargetSpeed::RPM_45)));
        assert_eq!(parse("speed=fast"), Err(CommandError::InvalidValue));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("Kp"), Err(CommandError::Syntax));
        assert_eq!(parse("Kx=1"), Err(CommandError::UnknownKey));
        assert_eq!(parse("Kp=abc"), Err(CommandError::InvalidValue));
        assert_eq!(parse("Kp=inf"), Err(CommandError::InvalidValue));
    }
}
