//! Dispatch Module
//!
//! Maps a command type string to the host-side function that handles it.
//!
//! ## Calling Convention
//! - Unknown type: `{"status":"error","message":"Unknown command type: <type>"}`
//! - Normal return: `{"status":"success","result":<value>}`
//! - Handler error or panic: `{"status":"error","message":<description>}`
//!
//! The table is built once at startup and is read-only afterwards, so it is
//! shared between connection threads as `Arc<Dispatcher<S>>` without locks.

mod handler;
mod table;

pub use handler::{call, Handler, HandlerError, HandlerResult};
pub(crate) use handler::panic_message;
pub use table::{unknown_command, Dispatcher, DispatcherBuilder};
