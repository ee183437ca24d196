//! Line Protocol
//!
//! MemoryDB clients talk to the server over a newline-delimited text protocol,
//! usable from `telnet` or `nc`.
//!
//! ## Modules
//!
//! - `types`: `Command`, `Reply` and reply formatting helpers
//! - `parser`: request line and TTL literal parsing
//!
//! ## Example
//!
//! ```
//! use memorydb::protocol::{parse_line, Command, Reply};
//!
//! let command = parse_line("get foo").unwrap();
//! assert_eq!(command, Command::Get { key: "foo".to_string() });
//!
//! let bytes = Reply::new("bar").serialize();
//! assert_eq!(&bytes[..], b"bar\n-> ");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_line, parse_ttl, ParseError, ParseResult};
pub use types::{describe_ttl, format_duration, Command, Reply, NEWLINE, PROMPT};
