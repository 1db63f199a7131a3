//! Scheduler Module
//!
//! Moves work from network threads onto the host's single execution loop.
//!
//! ## Concurrency Model
//!
//! ```text
//!  connection thread ─┐
//!  connection thread ─┼──► Scheduler::schedule ──► [ FIFO queue ] ──► HostLoop::tick
//!  connection thread ─┘          (never blocks)                      (host thread only)
//!         ▲                                                                │
//!         └──────────────────── one-shot result sink ◄─────────────────────┘
//! ```
//!
//! - `Scheduler` handles are cheap to clone and may be used from any thread.
//! - `HostLoop` owns the receiving end and is driven by the host's own loop,
//!   so work items run one at a time, in enqueue order, and never alongside
//!   the host's per-tick logic.
//! - The host state `S` is only ever reached through `&mut S` on the host
//!   thread; it needs no locks and does not have to be `Send`.

mod queue;
mod host_loop;

pub use queue::{channel, PendingExecution, Scheduler, Work};
pub use host_loop::HostLoop;
