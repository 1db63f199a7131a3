//! Client Driver
//!
//! Sends one command per connection and waits for the server to close.
//!
//! ## Call Phases
//! ```text
//! Idle → Connecting → Sending → Receiving → Decoding → Done
//!            │           │          │
//!            └───────────┴──────────┴──► TimedOut | ConnectionFailed
//! ```
//! Every outcome is a `Response`; transport failures become
//! `{"status":"error"}` responses instead of propagating.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::protocol::{Command, Params, Response, READ_CHUNK_SIZE};

/// Where a call is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Connecting,
    Sending,
    Receiving,
    Decoding,
    Done,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallPhase::Idle => "idle",
            CallPhase::Connecting => "connecting",
            CallPhase::Sending => "sending",
            CallPhase::Receiving => "receiving",
            CallPhase::Decoding => "decoding",
            CallPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Stateless client; each call opens its own connection
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a client with the given config
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Create a client for `addr` with default timeouts
    pub fn connect_to(addr: impl Into<String>) -> Self {
        Self::new(ClientConfig::builder().server_addr(addr).build())
    }

    /// Send a command using the configured timeout class for its type
    pub fn send_command(&self, command_type: &str, params: Params) -> Response {
        let timeout = self.config.timeout_for(command_type);
        self.send(command_type, params, timeout)
    }

    /// Send a command; transport failures come back as error responses
    pub fn send(&self, command_type: &str, params: Params, timeout: Duration) -> Response {
        match self.try_send(command_type, params, timeout) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("{} to {} failed: {}", command_type, self.config.server_addr, e);
                Response::error(e.to_string())
            }
        }
    }

    /// Send a command, keeping transport failures distinct from
    /// application-level error responses
    pub fn try_send(
        &self,
        command_type: &str,
        params: Params,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let command = Command::with_params(command_type, params);
        let payload = serde_json::to_vec(&command).map_err(TransportError::Encode)?;
        // A timeout too large to represent means the call has no deadline
        let deadline = Instant::now().checked_add(timeout);

        tracing::trace!("{} -> {}: {}", command_type, self.config.server_addr, CallPhase::Connecting);
        let mut stream = self.open(deadline, timeout)?;
        let _ = stream.set_nodelay(true);

        tracing::trace!("{}: {} {} byte(s)", command_type, CallPhase::Sending, payload.len());
        let left = remaining(deadline, CallPhase::Sending, timeout)?;
        stream
            .set_write_timeout(left)
            .and_then(|_| stream.write_all(&payload))
            .and_then(|_| stream.flush())
            .map_err(|e| io_error(CallPhase::Sending, e, timeout))?;

        tracing::trace!("{}: {}", command_type, CallPhase::Receiving);
        let bytes = read_until_closed(&mut stream, deadline, timeout)?;

        tracing::trace!("{}: {} {} byte(s)", command_type, CallPhase::Decoding, bytes.len());
        if bytes.is_empty() {
            return Err(TransportError::EmptyResponse);
        }
        let response = serde_json::from_slice(&bytes).map_err(TransportError::Decode)?;

        tracing::trace!("{}: {}", command_type, CallPhase::Done);
        Ok(response)
    }

    /// Whether a server answers at all
    pub fn is_reachable(&self) -> bool {
        let timeout = self.config.timeout_for("ping");
        self.try_send("ping", Params::new(), timeout).is_ok()
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to the first address that accepts before the deadline
    fn open(&self, deadline: Option<Instant>, timeout: Duration) -> Result<TcpStream, TransportError> {
        let addr = &self.config.server_addr;
        let candidates = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Resolve {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let mut last_error = None;
        for candidate in candidates {
            let left = remaining(deadline, CallPhase::Connecting, timeout)?;
            let connected = match left {
                Some(left) => TcpStream::connect_timeout(&candidate, left),
                None => TcpStream::connect(candidate),
            };
            match connected {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Err(TransportError::TimedOut {
                    phase: CallPhase::Connecting,
                    timeout,
                })
            }
            Some(source) => Err(TransportError::Connect {
                addr: addr.clone(),
                source,
            }),
            None => Err(TransportError::Resolve {
                addr: addr.clone(),
                reason: "no addresses".to_string(),
            }),
        }
    }
}

/// Read until the server closes; partial data at the deadline is discarded
fn read_until_closed(
    stream: &mut TcpStream,
    deadline: Option<Instant>,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let mut response = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let left = remaining(deadline, CallPhase::Receiving, timeout)?;
        stream
            .set_read_timeout(left)
            .map_err(|e| io_error(CallPhase::Receiving, e, timeout))?;

        match stream.read(&mut chunk) {
            Ok(0) => return Ok(response),
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            // The deadline check at the top of the loop decides when to give up
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(e) => return Err(io_error(CallPhase::Receiving, e, timeout)),
        }
    }
}

/// Time left before the deadline; `None` when the call is unbounded
fn remaining(
    deadline: Option<Instant>,
    phase: CallPhase,
    timeout: Duration,
) -> Result<Option<Duration>, TransportError> {
    let Some(deadline) = deadline else {
        return Ok(None);
    };
    let now = Instant::now();
    if now >= deadline {
        Err(TransportError::TimedOut { phase, timeout })
    } else {
        Ok(Some(deadline - now))
    }
}

fn io_error(phase: CallPhase, source: std::io::Error, timeout: Duration) -> TransportError {
    match source.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::TimedOut { phase, timeout },
        _ => TransportError::Io { phase, source },
    }
}
