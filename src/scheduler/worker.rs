use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use smallvec::SmallVec;

use super::{
  task::{Action, ScheduledTask, TaskHandle},
  DispatchScheduler, Duration, Instant,
};
use crate::subscription::Disposable;

/// Longest delay a task can wait for, about thirty years.
pub const MAX_DELAY: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

struct WorkerState {
  disposed: bool,
  pending: SmallVec<[TaskHandle; 4]>,
}

struct WorkerInner {
  scheduler: DispatchScheduler,
  state: Mutex<WorkerState>,
}

/// A cancellable group of tasks bound to one [`DispatchScheduler`].
///
/// Tasks scheduled through the same worker from the same thread run in FIFO
/// order. Disposing the worker cancels every task it still has pending and
/// rejects anything scheduled later; other workers are unaffected.
#[derive(Clone)]
pub struct Worker {
  inner: Arc<WorkerInner>,
}

impl Worker {
  pub(crate) fn new(scheduler: DispatchScheduler) -> Self {
    Worker {
      inner: Arc::new(WorkerInner {
        scheduler,
        state: Mutex::new(WorkerState { disposed: false, pending: SmallVec::new() }),
      }),
    }
  }

  /// Run `action` on the dispatch thread.
  ///
  /// On the dispatch thread itself the action runs synchronously, before
  /// this call returns. Anywhere else it is queued behind the tasks already
  /// posted.
  pub fn schedule<F>(&self, action: F) -> TaskHandle
  where
    F: FnOnce() + Send + 'static,
  {
    self.submit(Box::new(action), None)
  }

  /// Run `action` on the dispatch thread once `delay` has elapsed.
  ///
  /// Always queued, even when called from the dispatch thread. There is no
  /// ordering guarantee against zero-delay tasks scheduled after it. Delays
  /// longer than [`MAX_DELAY`] are clamped to it.
  pub fn schedule_delayed<F>(&self, action: F, delay: Duration) -> TaskHandle
  where
    F: FnOnce() + Send + 'static,
  {
    let now = Instant::now();
    let at = now.checked_add(delay.min(MAX_DELAY)).unwrap_or(now);
    self.submit(Box::new(action), Some(at))
  }

  pub fn scheduler(&self) -> &DispatchScheduler { &self.inner.scheduler }

  fn state(&self) -> MutexGuard<'_, WorkerState> {
    self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn submit(&self, action: Action, at: Option<Instant>) -> TaskHandle {
    let scheduler = &self.inner.scheduler;
    if scheduler.is_disposed() {
      return scheduler.reject();
    }
    let mut state = self.state();
    if state.disposed {
      debug!("worker on `{}` is disposed, task rejected", scheduler.name());
      return TaskHandle::rejected();
    }
    let (task, handle) = ScheduledTask::new(action);
    if at.is_none() && scheduler.is_dispatch_thread() {
      drop(state);
      task.run();
      return handle;
    }
    state.pending.retain(|pending| !pending.is_disposed());
    state.pending.push(handle.clone());
    drop(state);
    scheduler.post(task, at);
    handle
  }
}

impl Disposable for Worker {
  /// Cancel every task this worker has not started yet.
  fn dispose(&self) {
    let pending = {
      let mut state = self.state();
      if state.disposed {
        return;
      }
      state.disposed = true;
      std::mem::take(&mut state.pending)
    };
    let cancelled = pending.iter().filter(|handle| handle.cancel()).count();
    debug!("worker on `{}` disposed, {} task(s) cancelled", self.inner.scheduler.name(), cancelled);
  }

  fn is_disposed(&self) -> bool { self.state().disposed }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc::channel;

  use super::*;
  use crate::scheduler::TaskStatus;

  fn gate(worker: &Worker) -> std::sync::mpsc::Sender<()> {
    // Park the dispatch thread until the returned sender fires.
    let (tx, rx) = channel::<()>();
    worker.schedule(move || {
      let _ = rx.recv();
    });
    tx
  }

  #[test]
  fn fifo_per_worker() {
    let scheduler = DispatchScheduler::new().unwrap();
    let worker = scheduler.create_worker();
    let seen = Arc::new(Mutex::new(vec![]));
    for i in 0..100 {
      let seen = seen.clone();
      worker.schedule(move || seen.lock().unwrap().push(i));
    }
    let last = worker.schedule(|| {});
    futures::executor::block_on(last);
    assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    scheduler.dispose();
  }

  #[test]
  fn runs_inline_on_dispatch_thread() {
    let scheduler = DispatchScheduler::new().unwrap();
    let worker = scheduler.create_worker();
    let (tx, rx) = channel();
    let inner = worker.clone();
    worker.schedule(move || {
      let ran = Arc::new(Mutex::new(false));
      let c_ran = ran.clone();
      let handle = inner.schedule(move || *c_ran.lock().unwrap() = true);
      tx.send((*ran.lock().unwrap(), handle.status())).unwrap();
    });
    assert_eq!(rx.recv().unwrap(), (true, TaskStatus::Finished));
    scheduler.dispose();
  }

  #[test]
  fn delayed_task_waits() {
    let scheduler = DispatchScheduler::new().unwrap();
    let worker = scheduler.create_worker();
    let delay = Duration::from_millis(30);
    let start = Instant::now();
    let (tx, rx) = channel();
    worker.schedule_delayed(move || tx.send(Instant::now()).unwrap(), delay);
    let ran_at = rx.recv().unwrap();
    assert!(ran_at.duration_since(start) >= delay);
    scheduler.dispose();
  }

  #[test]
  fn delayed_from_dispatch_thread_is_queued() {
    let scheduler = DispatchScheduler::new().unwrap();
    let worker = scheduler.create_worker();
    let (tx, rx) = channel();
    let inner = worker.clone();
    worker.schedule(move || {
      let handle = inner.schedule_delayed(|| {}, Duration::from_millis(1));
      tx.send(handle.status()).unwrap();
    });
    assert_eq!(rx.recv().unwrap(), TaskStatus::Pending);
    scheduler.dispose();
  }

  #[test]
  fn cancelled_task_never_runs() {
    let scheduler = DispatchScheduler::new().unwrap();
    let worker = scheduler.create_worker();
    let release = gate(&worker);
    let handle = worker.schedule(|| panic!("cancelled task ran"));
    handle.dispose();
    release.send(()).unwrap();
    assert_eq!(futures::executor::block_on(handle), TaskStatus::Cancelled);
    scheduler.dispose();
  }

  #[test]
  fn dispose_cancels_only_own_tasks() {
    let scheduler = DispatchScheduler::new().unwrap();
    let a = scheduler.create_worker();
    let b = scheduler.create_worker();
    let release = gate(&scheduler.create_worker());
    let ran = Arc::new(Mutex::new(vec![]));
    let (c1, c2) = (ran.clone(), ran.clone());
    let from_a = a.schedule(move || c1.lock().unwrap().push("a"));
    let from_b = b.schedule(move || c2.lock().unwrap().push("b"));
    a.dispose();
    assert!(a.is_disposed());
    assert!(!b.is_disposed());
    release.send(()).unwrap();
    assert_eq!(futures::executor::block_on(from_b), TaskStatus::Finished);
    assert_eq!(from_a.status(), TaskStatus::Cancelled);
    assert_eq!(*ran.lock().unwrap(), vec!["b"]);
    scheduler.dispose();
  }

  #[test]
  fn oversized_delay_is_clamped() {
    let scheduler = DispatchScheduler::new().unwrap();
    let worker = scheduler.create_worker();
    let parked = worker.schedule_delayed(|| panic!("parked task ran"), Duration::MAX);
    assert_eq!(parked.status(), TaskStatus::Pending);

    let next = worker.schedule(|| {});
    assert_eq!(futures::executor::block_on(next), TaskStatus::Finished);
    assert_eq!(parked.status(), TaskStatus::Pending);

    worker.dispose();
    assert_eq!(futures::executor::block_on(parked), TaskStatus::Cancelled);
    scheduler.dispose();
  }

  #[test]
  fn disposed_worker_rejects_silently() {
    let scheduler = DispatchScheduler::new().unwrap();
    let worker = scheduler.create_worker();
    worker.dispose();
    worker.dispose();
    let handle = worker.schedule(|| panic!("rejected task ran"));
    assert_eq!(handle.status(), TaskStatus::Rejected);
    let delayed = worker.schedule_delayed(|| {}, Duration::from_millis(1));
    assert_eq!(delayed.status(), TaskStatus::Rejected);
    scheduler.dispose();
  }
}
