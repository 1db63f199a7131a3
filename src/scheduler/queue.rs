//! The thread-safe half of the scheduler

use std::sync::Arc;

use crossbeam::channel::{self as cb, Receiver, Sender};

use super::HostLoop;
use crate::dispatch::{call, Handler};
use crate::error::{RelayError, Result};
use crate::protocol::{Params, Response};

/// A unit of work for the host loop
pub type Work<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Create a connected scheduler / host loop pair
pub fn channel<S>() -> (Scheduler<S>, HostLoop<S>) {
    let (tx, rx) = cb::unbounded();
    (Scheduler { tx }, HostLoop::new(rx))
}

/// Submits work to the host loop from any thread
pub struct Scheduler<S> {
    tx: Sender<Work<S>>,
}

impl<S> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> Scheduler<S> {
    /// Queue `work` for the next tick and return immediately
    pub fn schedule<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx
            .send(Box::new(work))
            .map_err(|_| RelayError::SchedulerClosed)
    }

    /// Queue a pending command execution
    pub fn submit(&self, pending: PendingExecution<S>) -> Result<()> {
        self.schedule(move |state: &mut S| pending.run(state))
    }

    /// Queue `work` and block until the host loop has run it
    pub fn execute<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = cb::bounded(1);
        self.schedule(move |state: &mut S| {
            let _ = tx.send(work(state));
        })?;
        rx.recv().map_err(|_| RelayError::ResultDropped)
    }
}

impl<S> Scheduler<S> {
    /// Number of items waiting for the host loop
    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

/// A resolved command waiting to run on the host loop
///
/// Owns everything it needs; the result goes back through a single-slot
/// channel to the connection thread that created it.
pub struct PendingExecution<S> {
    command_type: String,
    handler: Arc<Handler<S>>,
    params: Params,
    reply: Sender<Response>,
}

impl<S> PendingExecution<S> {
    /// Create a pending execution and the receiver its result will arrive on
    pub fn new(
        command_type: impl Into<String>,
        handler: Arc<Handler<S>>,
        params: Params,
    ) -> (Self, Receiver<Response>) {
        let (reply, result) = cb::bounded(1);
        let pending = Self {
            command_type: command_type.into(),
            handler,
            params,
            reply,
        };
        (pending, result)
    }

    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    /// Run the handler and deliver the response
    pub fn run(self, state: &mut S) {
        let response = call(self.handler.as_ref(), state, &self.command_type, self.params);
        if self.reply.send(response).is_err() {
            tracing::debug!(
                "Result for {} discarded, requester is gone",
                self.command_type
            );
        }
    }
}
