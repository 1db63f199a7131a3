//! The host-thread half of the scheduler

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use super::Work;
use crate::dispatch::panic_message;

/// Drains scheduled work on the host's own thread
pub struct HostLoop<S> {
    rx: Receiver<Work<S>>,

    /// Item taken off the queue while waiting; it was the queue head, so it
    /// runs first on the next tick
    carried: Option<Work<S>>,

    ticks: u64,
    executed: u64,
}

impl<S> HostLoop<S> {
    pub(super) fn new(rx: Receiver<Work<S>>) -> Self {
        Self {
            rx,
            carried: None,
            ticks: 0,
            executed: 0,
        }
    }

    /// Run every item that was queued when the tick began, in FIFO order
    ///
    /// Items scheduled while the tick is running wait for the next one.
    /// Returns the number of items run.
    pub fn tick(&mut self, state: &mut S) -> usize {
        self.ticks += 1;

        let mut ran = 0;
        if let Some(work) = self.carried.take() {
            run_work(work, state);
            ran += 1;
        }

        let queued = self.rx.len();
        for _ in 0..queued {
            match self.rx.try_recv() {
                Ok(work) => {
                    run_work(work, state);
                    ran += 1;
                }
                Err(_) => break,
            }
        }

        self.executed += ran as u64;
        ran
    }

    /// Drive ticks until `running` is cleared or every scheduler is dropped
    ///
    /// Each iteration drains the queue, then runs the host's own per-tick
    /// work, then waits up to `tick_interval` for more work to arrive.
    /// Consumes the loop: once the final drain is done the queue closes, and
    /// later `schedule` calls fail with `SchedulerClosed` instead of waiting.
    pub fn run<F>(
        mut self,
        state: &mut S,
        tick_interval: Duration,
        running: &AtomicBool,
        mut per_tick: F,
    ) where
        F: FnMut(&mut S),
    {
        tracing::debug!("Host loop started");

        while running.load(Ordering::SeqCst) {
            let ran = self.tick(state);
            if ran > 0 {
                tracing::trace!("Tick {} ran {} item(s)", self.ticks, ran);
            }

            per_tick(state);

            if self.carried.is_none() {
                match self.rx.recv_timeout(tick_interval) {
                    Ok(work) => self.carried = Some(work),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!("All schedulers dropped, host loop exiting");
                        break;
                    }
                }
            }
        }

        // Work accepted before shutdown still gets its answer
        let ran = self.tick(state);
        tracing::debug!(
            "Host loop stopped after {} ticks ({} item(s) in the final drain)",
            self.ticks,
            ran
        );
    }

    /// Number of ticks so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of work items run so far
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Number of items waiting for the next tick
    pub fn queued(&self) -> usize {
        self.rx.len() + usize::from(self.carried.is_some())
    }
}

fn run_work<S>(work: Work<S>, state: &mut S) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| work(state))) {
        tracing::error!(
            "Scheduled work panicked: {}",
            panic_message(&*payload)
        );
    }
}
