//! Configuration for hostlink
//!
//! Centralized configuration with sensible defaults.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Default TCP port the relay listens on
pub const DEFAULT_PORT: u16 = 9876;

/// Default listen / connect address
pub const DEFAULT_ADDR: &str = "127.0.0.1:9876";

/// Server-side configuration
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address (host:port)
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// How often the accept loop and idle connections re-check the
    /// running flag (milliseconds)
    pub accept_poll_ms: u64,

    /// Pause after a failed accept before retrying (milliseconds)
    pub error_backoff_ms: u64,

    /// Upper bound `stop()` waits for the accept thread (milliseconds)
    pub join_timeout_ms: u64,

    /// Close a connection that has not delivered a full command after this
    /// long (milliseconds, 0 = never)
    pub idle_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Largest request envelope accepted before the connection is rejected
    pub max_request_bytes: usize,

    // -------------------------------------------------------------------------
    // Host Loop Configuration
    // -------------------------------------------------------------------------
    /// Interval between host loop ticks when idle (milliseconds)
    pub tick_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_ADDR.to_string(),
            max_connections: 64,
            accept_poll_ms: 100,
            error_backoff_ms: 500,
            join_timeout_ms: 1000,
            idle_timeout_ms: 0,
            write_timeout_ms: 5000,
            max_request_bytes: 16 * 1024 * 1024, // 16 MB
            tick_interval_ms: 10,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values that would otherwise make the server spin or refuse
    /// every connection.
    pub fn validate(&self) -> Result<()> {
        if self.accept_poll_ms == 0 {
            return Err(RelayError::Config("accept_poll_ms must be > 0".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(RelayError::Config("tick_interval_ms must be > 0".into()));
        }
        if self.max_connections == 0 {
            return Err(RelayError::Config("max_connections must be > 0".into()));
        }
        if self.max_request_bytes == 0 {
            return Err(RelayError::Config("max_request_bytes must be > 0".into()));
        }
        resolve_addr(&self.listen_addr)?;
        Ok(())
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Resolve a `host:port` string to its first socket address
pub fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| RelayError::Config(format!("invalid address {addr}: {e}")))?
        .next()
        .ok_or_else(|| RelayError::Config(format!("address {addr} resolved to nothing")))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the accept / idle poll interval (in milliseconds)
    pub fn accept_poll_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_ms = ms;
        self
    }

    /// Set the accept error backoff (in milliseconds)
    pub fn error_backoff_ms(mut self, ms: u64) -> Self {
        self.config.error_backoff_ms = ms;
        self
    }

    /// Set the bound on joining the accept thread (in milliseconds)
    pub fn join_timeout_ms(mut self, ms: u64) -> Self {
        self.config.join_timeout_ms = ms;
        self
    }

    /// Set the idle timeout (in milliseconds, 0 disables it)
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the largest accepted request size (in bytes)
    pub fn max_request_bytes(mut self, size: usize) -> Self {
        self.config.max_request_bytes = size;
        self
    }

    /// Set the host loop tick interval (in milliseconds)
    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.tick_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Client driver configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (host:port)
    pub server_addr: String,

    /// Timeout for ordinary commands (milliseconds)
    pub default_timeout_ms: u64,

    /// Timeout for commands listed in `heavy_commands` (milliseconds)
    pub heavy_timeout_ms: u64,

    /// Command types known to run long on the host
    pub heavy_commands: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_ADDR.to_string(),
            default_timeout_ms: 10_000,
            heavy_timeout_ms: 30_000,
            heavy_commands: vec!["generate_3d_model".to_string(), "render_scene".to_string()],
        }
    }
}

impl ClientConfig {
    /// Create a new client config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Timeout to apply to a command of the given type
    pub fn timeout_for(&self, command_type: &str) -> Duration {
        if self.heavy_commands.iter().any(|c| c == command_type) {
            Duration::from_millis(self.heavy_timeout_ms)
        } else {
            Duration::from_millis(self.default_timeout_ms)
        }
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server address
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the ordinary command timeout (in milliseconds)
    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.config.default_timeout_ms = ms;
        self
    }

    /// Set the heavy command timeout (in milliseconds)
    pub fn heavy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.heavy_timeout_ms = ms;
        self
    }

    /// Mark a command type as heavy
    pub fn heavy_command(mut self, command_type: impl Into<String>) -> Self {
        self.config.heavy_commands.push(command_type.into());
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
