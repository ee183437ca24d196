//! Server Configuration
//!
//! Every tunable of the server, with defaults matching the stock deployment,
//! plus command-line parsing for the binary.

use crate::connection::DEFAULT_MAX_SESSIONS;
use crate::storage::{DEFAULT_CAPACITY, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The default port MemoryDB listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host MemoryDB binds to (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// How long the acceptor waits for a connection before re-checking the stop flag
pub const DEFAULT_ACCEPT_POLL: Duration = Duration::from_secs(2);

/// Grace period given to connected clients during shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the shutdown snapshot is written
pub const DEFAULT_SNAPSHOT_PATH: &str = "db.json";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Maximum concurrently active sessions
    pub max_users: usize,
    /// Maximum live entries in the store
    pub capacity: usize,
    /// TTL applied when a command asks for the default
    pub default_ttl: Duration,
    /// Interval between background sweeps (zero disables the reclaimer)
    pub sweep_interval: Duration,
    /// Bounded wait of each accept attempt
    pub accept_poll: Duration,
    /// Fixed wait between the shutdown warning and the forced close
    pub drain_timeout: Duration,
    /// Snapshot file location
    pub snapshot_path: PathBuf,
    /// Restore the snapshot at startup instead of starting empty
    pub load_snapshot: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_users: DEFAULT_MAX_SESSIONS,
            capacity: DEFAULT_CAPACITY,
            default_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            accept_poll: DEFAULT_ACCEPT_POLL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            load_snapshot: false,
        }
    }
}

/// What the binary should do after parsing its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

/// Invalid command-line arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

impl Config {
    /// Parses command-line arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().ok_or(ConfigError::MissingValue(arg))?;
                }
                "--port" | "-p" => {
                    let value = args.next().ok_or_else(|| ConfigError::MissingValue(arg.clone()))?;
                    config.port = value.parse().map_err(|_| ConfigError::InvalidPort(value))?;
                }
                "--snapshot" => {
                    let value = args.next().ok_or(ConfigError::MissingValue(arg))?;
                    config.snapshot_path = PathBuf::from(value);
                }
                "--restore" => config.load_snapshot = true,
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_users(mut self, max_users: usize) -> Self {
        self.max_users = max_users;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_accept_poll(mut self, poll: Duration) -> Self {
        self.accept_poll = poll;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn with_load_snapshot(mut self, load: bool) -> Self {
        self.load_snapshot = load;
        self
    }
}
