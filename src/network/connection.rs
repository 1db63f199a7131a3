//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{ErrorKind, Read};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::dispatch::{unknown_command, Dispatcher};
use crate::error::{RelayError, Result};
use crate::protocol::{write_response, Command, FrameBuffer, Response, READ_CHUNK_SIZE};
use crate::scheduler::{PendingExecution, Scheduler};

/// How reading a request ended
#[derive(Debug)]
enum ReadOutcome {
    Command(Command),
    Closed,
    Stopped,
    IdleTimeout,
}

/// Handles a single client connection
pub struct Connection<S> {
    /// TCP stream, read and written directly
    stream: TcpStream,

    /// Bytes received so far
    buffer: FrameBuffer,

    /// Route to the host loop
    scheduler: Scheduler<S>,

    /// Handler lookup
    dispatcher: Arc<Dispatcher<S>>,

    /// Cleared when the server stops
    running: Arc<AtomicBool>,

    idle_timeout: Option<Duration>,

    /// Peer address for logging
    peer_addr: String,
}

impl<S: 'static> Connection<S> {
    /// Create a new connection handler
    ///
    /// Configures Nagle and socket timeouts from `config`.
    pub fn new(
        stream: TcpStream,
        scheduler: Scheduler<S>,
        dispatcher: Arc<Dispatcher<S>>,
        running: Arc<AtomicBool>,
        config: &Config,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(config.accept_poll()))?;
        stream.set_write_timeout(config.write_timeout())?;

        Ok(Self {
            stream,
            buffer: FrameBuffer::new(config.max_request_bytes),
            scheduler,
            dispatcher,
            running,
            idle_timeout: config.idle_timeout(),
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads one command, runs it on the host loop, writes the response and
    /// closes. Returns when the response is written or the client goes away.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let command = match self.read_command() {
            Ok(ReadOutcome::Command(command)) => command,
            Ok(ReadOutcome::Closed) => {
                tracing::debug!("Client {} disconnected", self.peer_addr);
                return Ok(());
            }
            Ok(ReadOutcome::Stopped) => {
                tracing::debug!("Server stopping, closing idle client {}", self.peer_addr);
                return Ok(());
            }
            Ok(ReadOutcome::IdleTimeout) => {
                tracing::debug!("Idle timeout for client {}", self.peer_addr);
                return Ok(());
            }
            Err(
                e @ (RelayError::MalformedRequest(_)
                | RelayError::InvalidEnvelope(_)
                | RelayError::RequestTooLarge { .. }),
            ) => {
                tracing::warn!("Rejecting request from {}: {}", self.peer_addr, e);
                let _ = self.send_response(&Response::error(e.to_string()));
                self.close();
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                return Err(e);
            }
        };

        tracing::trace!(
            "Received command from {}: {}",
            self.peer_addr,
            command.command_type
        );

        let Some(response) = self.execute_command(command) else {
            tracing::warn!(
                "Host loop unavailable, closing {} without a response",
                self.peer_addr
            );
            return Ok(());
        };

        if let Err(e) = self.send_response(&response) {
            // The client may have given up waiting (its own timeout); that is
            // not a server error.
            if let RelayError::Io(ref io_err) = e {
                match io_err.kind() {
                    ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionReset
                    | ErrorKind::BrokenPipe => {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                    _ => {}
                }
            }
            tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
            return Err(e);
        }

        self.close();
        tracing::debug!("Connection to {} closed", self.peer_addr);
        Ok(())
    }

    /// Accumulate bytes until they form one command
    fn read_command(&mut self) -> Result<ReadOutcome> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let started = Instant::now();

        loop {
            let n = match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => n,
                // Read timeout (Windows uses TimedOut instead of WouldBlock)
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if !self.running.load(Ordering::SeqCst) {
                        return Ok(ReadOutcome::Stopped);
                    }
                    if self
                        .idle_timeout
                        .is_some_and(|limit| started.elapsed() >= limit)
                    {
                        return Ok(ReadOutcome::IdleTimeout);
                    }
                    continue;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                    ) =>
                {
                    return Ok(ReadOutcome::Closed);
                }
                Err(e) => return Err(e.into()),
            };

            self.buffer.extend(&chunk[..n])?;
            if let Some(command) = self.buffer.try_parse_command()? {
                return Ok(ReadOutcome::Command(command));
            }
            tracing::trace!(
                "Buffered {} byte(s) from {}, waiting for more",
                self.buffer.len(),
                self.peer_addr
            );
        }
    }

    /// Run a command on the host loop and wait for its response
    ///
    /// `None` means the host loop is gone.
    fn execute_command(&self, command: Command) -> Option<Response> {
        let Command {
            command_type,
            params,
        } = command;

        let Some(handler) = self.dispatcher.resolve(&command_type) else {
            tracing::debug!("Unknown command type from {}: {}", self.peer_addr, command_type);
            return Some(unknown_command(&command_type));
        };

        let (pending, result) = PendingExecution::new(command_type, handler, params);
        if let Err(e) = self.scheduler.submit(pending) {
            tracing::warn!("Failed to schedule command from {}: {}", self.peer_addr, e);
            return None;
        }

        result.recv().ok()
    }

    /// Send a response to the client
    fn send_response(&mut self, response: &Response) -> Result<()> {
        write_response(&mut self.stream, response)
    }

    fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Write);
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
