//! Request Line Parser
//!
//! Turns one request line into a [`Command`]. The line is trimmed and
//! case-folded, then split on whitespace:
//!
//! ```text
//! "  SET Foo Bar 10s \r"  ──trim/lowercase──>  "set foo bar 10s"  ──>  Command::Set
//! ```
//!
//! ## TTL Literals
//!
//! TTLs are duration literals such as `10s`, `5m`, `1h30m`, `1.5h` or `250ms`
//! (units `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`). A zero duration (`0`, `0s`)
//! selects the store default, a negative one or the keyword `never` disables
//! expiry. Anything else is rejected instead of silently falling back.

use crate::protocol::types::Command;
use crate::storage::Ttl;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while parsing a request line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unrecognized command or wrong number of arguments; carries the trimmed line
    #[error("Unknown: {0}")]
    Unknown(String),

    /// TTL argument is not a duration literal
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses one request line (without its trailing newline).
///
/// # Example
///
/// ```
/// use memorydb::protocol::{parse_line, Command};
///
/// assert_eq!(
///     parse_line("GET Foo").unwrap(),
///     Command::Get { key: "foo".to_string() }
/// );
/// ```
pub fn parse_line(line: &str) -> ParseResult<Command> {
    let trimmed = line.trim();
    let normalized = trimmed.to_lowercase();
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let unknown = || ParseError::Unknown(trimmed.to_string());

    match tokens.as_slice() {
        ["set", key, value, ttl] => Ok(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl: parse_ttl(ttl)?,
        }),
        ["add", key, value, ttl] => Ok(Command::Add {
            key: key.to_string(),
            value: value.to_string(),
            ttl: parse_ttl(ttl)?,
        }),
        ["get", key] => Ok(Command::Get {
            key: key.to_string(),
        }),
        ["delete", key] => Ok(Command::Delete {
            key: key.to_string(),
        }),
        ["exit"] => Ok(Command::Exit),
        _ => Err(unknown()),
    }
}

/// Parses a TTL literal.
pub fn parse_ttl(literal: &str) -> ParseResult<Ttl> {
    if literal == "never" {
        return Ok(Ttl::Never);
    }

    let nanos = parse_duration_nanos(literal)
        .ok_or_else(|| ParseError::InvalidTtl(literal.to_string()))?;

    Ok(match nanos {
        0 => Ttl::Default,
        n if n < 0 => Ttl::Never,
        n => Ttl::After(Duration::from_nanos(n as u64)),
    })
}

/// Parses a signed duration literal into nanoseconds.
///
/// Returns `None` for malformed input or values that do not fit in an `i64`.
fn parse_duration_nanos(s: &str) -> Option<i128> {
    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (int_part, after) = split_digits(rest);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(after) => split_digits(after),
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let scale = unit_nanos(unit)?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut nanos = whole.checked_mul(scale)?;

        if !frac_part.is_empty() {
            // Digits past nanosecond resolution of an hour don't matter.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().ok()?;
            nanos = nanos.checked_add(frac * scale / 10u128.pow(digits.len() as u32))?;
        }

        total = total.checked_add(nanos)?;
        rest = after;
    }

    if total > i64::MAX as u128 {
        return None;
    }
    let total = total as i128;
    Some(if negative { -total } else { total })
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3600 * 1_000_000_000,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Ttl {
        Ttl::After(Duration::from_secs(n))
    }

    #[test]
    fn test_parse_set_and_add() {
        assert_eq!(
            parse_line("set foo bar 10s").unwrap(),
            Command::Set {
                key: "foo".to_string(),
                value: "bar".to_string(),
                ttl: secs(10),
            }
        );
        assert_eq!(
            parse_line("ADD Foo BAZ 5M").unwrap(),
            Command::Add {
                key: "foo".to_string(),
                value: "baz".to_string(),
                ttl: secs(300),
            }
        );
    }

    #[test]
    fn test_parse_normalizes_whitespace() {
        assert_eq!(
            parse_line("  get   foo \r").unwrap(),
            Command::Get {
                key: "foo".to_string()
            }
        );
        assert_eq!(parse_line("\tEXIT ").unwrap(), Command::Exit);
    }

    #[test]
    fn test_parse_delete() {
        assert_eq!(
            parse_line("delete foo").unwrap(),
            Command::Delete {
                key: "foo".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_keeps_original_case() {
        assert_eq!(
            parse_line("  PING Me ").unwrap_err().to_string(),
            "Unknown: PING Me"
        );
        // Wrong arity is treated as unknown input
        assert_eq!(
            parse_line("get").unwrap_err(),
            ParseError::Unknown("get".to_string())
        );
        assert_eq!(
            parse_line("set foo bar").unwrap_err(),
            ParseError::Unknown("set foo bar".to_string())
        );
        assert_eq!(parse_line("").unwrap_err(), ParseError::Unknown(String::new()));
    }

    #[test]
    fn test_ttl_zero_is_default() {
        assert_eq!(parse_ttl("0").unwrap(), Ttl::Default);
        assert_eq!(parse_ttl("0s").unwrap(), Ttl::Default);
        assert_eq!(
            parse_line("set x 1 0").unwrap(),
            Command::Set {
                key: "x".to_string(),
                value: "1".to_string(),
                ttl: Ttl::Default,
            }
        );
    }

    #[test]
    fn test_ttl_never() {
        assert_eq!(parse_ttl("never").unwrap(), Ttl::Never);
        assert_eq!(parse_ttl("-1s").unwrap(), Ttl::Never);
    }

    #[test]
    fn test_ttl_compound_and_fractional() {
        assert_eq!(parse_ttl("1h30m").unwrap(), secs(5400));
        assert_eq!(parse_ttl("1.5h").unwrap(), secs(5400));
        assert_eq!(
            parse_ttl("250ms").unwrap(),
            Ttl::After(Duration::from_millis(250))
        );
        assert_eq!(
            parse_ttl("10us").unwrap(),
            Ttl::After(Duration::from_micros(10))
        );
        assert_eq!(parse_ttl(".5s").unwrap(), Ttl::After(Duration::from_millis(500)));
    }

    #[test]
    fn test_ttl_rejects_garbage() {
        for literal in ["abc", "10", "5x", "s", "1..5s", "-", "99999999999h"] {
            assert_eq!(
                parse_ttl(literal),
                Err(ParseError::InvalidTtl(literal.to_string())),
                "literal {literal:?}"
            );
        }
        assert_eq!(
            parse_line("set k v soon").unwrap_err().to_string(),
            "Invalid TTL: soon"
        );
    }
}
