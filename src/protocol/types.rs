//! Line Protocol Types
//!
//! MemoryDB speaks a plain-text, newline-delimited protocol. Every request is a
//! single line; every reply is a single message line followed by a prompt marker:
//!
//! ```text
//! client: set foo bar 10s\n
//! server: Set value for key foo, expires in 10s\n->
//! client: get foo\n
//! server: bar\n->
//! ```

use crate::storage::Ttl;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::time::Duration;

/// Line terminator for requests and replies
pub const NEWLINE: u8 = b'\n';

/// Prompt marker written after every reply
pub const PROMPT: &str = "-> ";

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET <key> <value> <ttl>`
    Set { key: String, value: String, ttl: Ttl },
    /// `ADD <key> <value> <ttl>`
    Add { key: String, value: String, ttl: Ttl },
    /// `GET <key>`
    Get { key: String },
    /// `DELETE <key>`
    Delete { key: String },
    /// `EXIT`
    Exit,
}

impl Command {
    /// The command keyword, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Add { .. } => "add",
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
            Command::Exit => "exit",
        }
    }
}

/// A single server message, framed as `<message>\n-> ` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply(String);

impl Reply {
    pub fn new(message: impl Into<String>) -> Self {
        Reply(message.into())
    }

    /// The message text, without framing.
    pub fn message(&self) -> &str {
        &self.0
    }

    /// Serializes the reply into its wire form.
    ///
    /// # Example
    /// ```
    /// use memorydb::protocol::Reply;
    /// assert_eq!(&Reply::new("bar").serialize()[..], b"bar\n-> ");
    /// ```
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.0.len() + 1 + PROMPT.len());
        buf.put_slice(self.0.as_bytes());
        buf.put_u8(NEWLINE);
        buf.put_slice(PROMPT.as_bytes());
        buf.freeze()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply(s)
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply(s.to_string())
    }
}

/// Formats a duration the way it is echoed back to clients: `10s`, `5m0s`, `1h2m3s`, `250ms`.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let secs = d.as_secs();
    let nanos = d.subsec_nanos();

    if secs == 0 {
        return if nanos < 1_000 {
            format!("{nanos}ns")
        } else if nanos < 1_000_000 {
            format!("{}µs", decimal(u64::from(nanos / 1_000), nanos % 1_000, 3))
        } else {
            format!("{}ms", decimal(u64::from(nanos / 1_000_000), nanos % 1_000_000, 6))
        };
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = decimal(secs % 60, nanos, 9);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Renders `whole.frac` with `frac` holding `digits` decimal places, trailing zeros trimmed.
fn decimal(whole: u64, frac: u32, digits: usize) -> String {
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0digits$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Describes a TTL for reply messages.
pub fn describe_ttl(ttl: Ttl, default_ttl: Duration) -> String {
    match ttl {
        Ttl::Default => format!("default ({})", format_duration(default_ttl)),
        Ttl::Never => "never".to_string(),
        Ttl::After(d) => format_duration(d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_framing() {
        let reply = Reply::new("Welcome to MemoryDB server");
        assert_eq!(&reply.serialize()[..], b"Welcome to MemoryDB server\n-> ");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m0s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_nanos(42)), "42ns");
    }

    #[test]
    fn test_describe_ttl() {
        let default = Duration::from_secs(300);
        assert_eq!(describe_ttl(Ttl::Default, default), "default (5m0s)");
        assert_eq!(describe_ttl(Ttl::Never, default), "never");
        assert_eq!(
            describe_ttl(Ttl::After(Duration::from_secs(10)), default),
            "10s"
        );
    }
}
