//! # hostlink
//!
//! Lets an external process drive a single-threaded host application over
//! TCP:
//! - JSON command envelopes, one request per connection
//! - A multi-threaded network layer
//! - Every command executed on the host's own cooperative loop, one at a time
//! - A stateless client that never raises transport failures
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │          (accept thread + one thread per client)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ PendingExecution
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Scheduler                                │
//! │                  (FIFO, any thread)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Host Loop                                │
//! │        (host thread, drains queue once per tick)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │  Dispatcher   │
//!               │ type → handler│
//!               └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use hostlink::{scheduler, Config, Dispatcher, Server};
//!
//! let dispatcher = Dispatcher::<u64>::builder()
//!     .register("count", |count: &mut u64, _params| {
//!         *count += 1;
//!         Ok((*count).into())
//!     })
//!     .build();
//!
//! let (scheduler, host_loop) = scheduler::channel();
//! let server = Server::new(Config::default(), scheduler, Arc::new(dispatcher));
//! server.start().unwrap();
//!
//! let running = AtomicBool::new(true);
//! let mut count = 0u64;
//! host_loop.run(&mut count, server.config().tick_interval(), &running, |_| {});
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod dispatch;
pub mod scheduler;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RelayError, Result, TransportError};
pub use config::{ClientConfig, Config};
pub use dispatch::{Dispatcher, HandlerError};
pub use network::{Client, Server};
pub use protocol::{Command, Params, Response};
pub use scheduler::{HostLoop, Scheduler};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of hostlink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
