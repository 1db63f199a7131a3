//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One thread per live connection, one request per connection
//! - Commands routed through the Scheduler onto the host loop
//! - Client opens a fresh connection for every call

mod server;
mod connection;
mod client;

pub use server::Server;
pub use connection::Connection;
pub use client::{CallPhase, Client};
