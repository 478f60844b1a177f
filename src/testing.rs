//! Helpers for tests that drive widgets on the dispatch thread.
//!
//! Widget state must only be touched on the dispatch thread, so a test
//! wraps each step in [`run_in_dispatch_thread`] and waits for it with
//! [`DispatchRun::await_terminal`]. A panic inside the step (a failed
//! assertion, say) is carried back and resumed on the test thread.

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::debug;

use crate::{
  scheduler::{DispatchScheduler, Duration, TaskHandle, Worker},
  subscription::Disposable,
};

type Outcome = Option<Box<dyn Any + Send>>;

/// Run `action` on the dispatch thread of `scheduler`.
///
/// Called on the dispatch thread itself, `action` has already run when this
/// returns. The run gets its own worker, disposed once `action` is done.
pub fn run_in_dispatch_thread<F>(scheduler: &DispatchScheduler, action: F) -> DispatchRun
where
  F: FnOnce() + Send + 'static,
{
  let (tx, rx) = bounded(1);
  let worker = scheduler.create_worker();
  let c_worker = worker.clone();
  let handle = worker.schedule(move || {
    let outcome = panic::catch_unwind(AssertUnwindSafe(action)).err();
    c_worker.dispose();
    let _ = tx.send(outcome);
  });
  DispatchRun { rx, handle, worker }
}

/// Pending result of [`run_in_dispatch_thread`].
#[must_use = "a DispatchRun does nothing unless awaited"]
pub struct DispatchRun {
  rx: Receiver<Outcome>,
  handle: TaskHandle,
  worker: Worker,
}

impl DispatchRun {
  pub fn handle(&self) -> &TaskHandle { &self.handle }

  /// Block until the work has run, then resume its panic if it had one.
  ///
  /// Returns immediately if the work was cancelled or rejected before it
  /// started.
  pub fn await_terminal(self) {
    let outcome = self.rx.recv();
    self.worker.dispose();
    match outcome {
      Ok(Some(payload)) => panic::resume_unwind(payload),
      Ok(None) => {}
      Err(_) => debug!("dispatch work dropped before running: {:?}", self.handle.status()),
    }
  }

  /// Like [`await_terminal`](Self::await_terminal), waiting at most
  /// `timeout`. Returns `true` if the work ran to completion in time.
  pub fn await_terminal_timeout(self, timeout: Duration) -> bool {
    let outcome = self.rx.recv_timeout(timeout);
    if !matches!(outcome, Err(RecvTimeoutError::Timeout)) {
      self.worker.dispose();
    }
    match outcome {
      Ok(Some(payload)) => panic::resume_unwind(payload),
      Ok(None) => true,
      Err(RecvTimeoutError::Timeout) => false,
      Err(RecvTimeoutError::Disconnected) => {
        debug!("dispatch work dropped before running: {:?}", self.handle.status());
        false
      }
    }
  }
}
