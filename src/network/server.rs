//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self as cb, Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use super::Connection;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{RelayError, Result};
use crate::scheduler::Scheduler;

/// TCP server for hostlink
///
/// Owned by whoever starts it; share it as `Arc<Server<S>>` if another part
/// of the program needs to stop it.
pub struct Server<S> {
    config: Config,
    scheduler: Scheduler<S>,
    dispatcher: Arc<Dispatcher<S>>,

    /// Live connection handlers
    active: Arc<AtomicUsize>,

    accept: Mutex<Option<AcceptThread>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

/// The background accept thread and its exit signal
struct AcceptThread {
    handle: JoinHandle<()>,

    /// Owned by this run alone, so a thread abandoned by `stop()` never
    /// sees a later `start()` flip it back on
    running: Arc<AtomicBool>,

    /// Disconnects when the thread ends, after the listener is dropped
    exited: Receiver<()>,
}

impl<S: 'static> Server<S> {
    /// Create a new server with the given config, scheduler and handlers
    pub fn new(config: Config, scheduler: Scheduler<S>, dispatcher: Arc<Dispatcher<S>>) -> Self {
        Self {
            config,
            scheduler,
            dispatcher,
            active: Arc::new(AtomicUsize::new(0)),
            accept: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Bind and start accepting in the background
    ///
    /// Returns the bound address (useful with port 0). Calling `start` on a
    /// running server logs a warning and returns the current address.
    pub fn start(&self) -> Result<SocketAddr> {
        let mut accept = self.accept.lock();
        if accept.is_some() {
            tracing::warn!("Server is already running");
            return self
                .local_addr()
                .ok_or_else(|| RelayError::Network("running server has no address".into()));
        }

        self.config.validate()?;

        let listener =
            TcpListener::bind(&self.config.listen_addr).map_err(|source| RelayError::Bind {
                addr: self.config.listen_addr.clone(),
                source,
            })?;
        // Non-blocking so the loop can notice `stop()` between accepts
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        // Shared with this run's accept thread and its connections
        let running = Arc::new(AtomicBool::new(true));

        let (exit_tx, exited) = cb::bounded::<()>(1);
        let accept_loop = AcceptLoop {
            listener,
            config: self.config.clone(),
            scheduler: self.scheduler.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            running: Arc::clone(&running),
            active: Arc::clone(&self.active),
        };

        let spawned = thread::Builder::new()
            .name("hostlink-accept".to_string())
            .spawn(move || {
                let _exit = exit_tx;
                accept_loop.run();
            });

        let handle = spawned?;

        *accept = Some(AcceptThread {
            handle,
            running,
            exited,
        });
        *self.local_addr.lock() = Some(local_addr);

        tracing::info!("Server listening on {}", local_addr);
        Ok(local_addr)
    }
}

impl<S> Server<S> {
    /// Signal the server to stop and release the port
    ///
    /// Idempotent. Waits at most `join_timeout` for the accept thread; a
    /// thread that does not exit in time is left behind.
    pub fn stop(&self) {
        let Some(accept) = self.accept.lock().take() else {
            return;
        };

        accept.running.store(false, Ordering::SeqCst);

        match accept.exited.recv_timeout(self.config.join_timeout()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if accept.handle.join().is_err() {
                    tracing::warn!("Accept thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Accept thread did not exit within {:?}, abandoning it",
                    self.config.join_timeout()
                );
            }
        }

        *self.local_addr.lock() = None;
        tracing::info!("Server stopped");
    }

    /// Whether the accept loop is active
    pub fn is_running(&self) -> bool {
        self.accept.lock().is_some()
    }

    /// The bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of connection handlers currently alive
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<S> Drop for Server<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Accept Loop
// =============================================================================

struct AcceptLoop<S> {
    listener: TcpListener,
    config: Config,
    scheduler: Scheduler<S>,
    dispatcher: Arc<Dispatcher<S>>,
    running: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl<S: 'static> AcceptLoop<S> {
    /// Runs until `running` is cleared; the listener closes when this returns
    fn run(self) {
        tracing::debug!("Accept loop started");

        let mut last_error: Option<ErrorKind> = None;
        while self.running.load(Ordering::SeqCst) {
            match accept_step(self.listener.accept(), &mut last_error) {
                AcceptStep::Accepted(stream, addr) => self.spawn_connection(stream, addr),
                AcceptStep::Idle => thread::sleep(self.config.accept_poll()),
                AcceptStep::Backoff { .. } => thread::sleep(self.config.error_backoff()),
            }
        }

        tracing::debug!("Accept loop stopped");
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
            tracing::warn!(
                "Connection limit ({}) reached, rejecting {}",
                self.config.max_connections,
                addr
            );
            return;
        }

        // Some platforms hand out accepted sockets in the listener's mode
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure connection from {}: {}", addr, e);
            return;
        }

        let connection = match Connection::new(
            stream,
            self.scheduler.clone(),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.running),
            &self.config,
        ) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                return;
            }
        };

        let guard = ActiveGuard::new(Arc::clone(&self.active));
        let spawned = thread::Builder::new()
            .name(format!("hostlink-conn-{addr}"))
            .spawn(move || {
                let _guard = guard;
                let mut connection = connection;
                if let Err(e) = connection.handle() {
                    tracing::warn!(
                        "Connection {} ended with error: {}",
                        connection.peer_addr(),
                        e
                    );
                }
            });

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn handler for {}: {}", addr, e);
        }
    }
}

/// What the accept loop does after one `accept()` call
#[derive(Debug)]
enum AcceptStep {
    Accepted(TcpStream, SocketAddr),

    /// Nothing pending; poll again after `accept_poll`
    Idle,

    /// A failed accept; retry after `error_backoff`
    Backoff { logged: bool },
}

/// Classify one accept result; repeats of the same error kind log once
fn accept_step(
    result: io::Result<(TcpStream, SocketAddr)>,
    last_error: &mut Option<ErrorKind>,
) -> AcceptStep {
    match result {
        Ok((stream, addr)) => {
            *last_error = None;
            tracing::debug!("Accepted connection from {}", addr);
            AcceptStep::Accepted(stream, addr)
        }
        Err(ref e) if e.kind() == ErrorKind::WouldBlock => AcceptStep::Idle,
        Err(e) => {
            let logged = *last_error != Some(e.kind());
            if logged {
                tracing::warn!("Error accepting connection: {}", e);
            }
            *last_error = Some(e.kind());
            AcceptStep::Backoff { logged }
        }
    }
}

/// Counts a connection as live until dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
