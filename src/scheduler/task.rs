use std::{
  future::Future,
  pin::Pin,
  sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex, PoisonError,
  },
  task::{Context, Poll},
};

use futures::task::AtomicWaker;

use crate::subscription::Disposable;

pub(crate) type Action = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;
const REJECTED: u8 = 4;

/// Where a scheduled task is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
  /// Waiting in the dispatch queue (or for its delay to elapse).
  Pending,
  /// Executing on the dispatch thread right now.
  Running,
  /// Ran to the end, or panicked while running.
  Finished,
  /// Cancelled before it started.
  Cancelled,
  /// Never accepted: its worker was disposed or its scheduler shut down.
  Rejected,
}

impl TaskStatus {
  fn from_raw(raw: u8) -> Self {
    match raw {
      PENDING => TaskStatus::Pending,
      RUNNING => TaskStatus::Running,
      FINISHED => TaskStatus::Finished,
      CANCELLED => TaskStatus::Cancelled,
      _ => TaskStatus::Rejected,
    }
  }

  /// The task will never run (again).
  pub fn is_terminal(self) -> bool {
    !matches!(self, TaskStatus::Pending | TaskStatus::Running)
  }
}

struct TaskCore {
  state: AtomicU8,
  action: Mutex<Option<Action>>,
  waker: AtomicWaker,
}

impl TaskCore {
  fn with_state(state: u8, action: Option<Action>) -> Arc<Self> {
    Arc::new(TaskCore {
      state: AtomicU8::new(state),
      action: Mutex::new(action),
      waker: AtomicWaker::new(),
    })
  }

  fn transition(&self, from: u8, to: u8) -> bool {
    self.state.compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire).is_ok()
  }

  fn take_action(&self) -> Option<Action> {
    self.action.lock().unwrap_or_else(PoisonError::into_inner).take()
  }

  fn cancel(&self) -> bool {
    if self.transition(PENDING, CANCELLED) {
      drop(self.take_action());
      self.waker.wake();
      true
    } else {
      false
    }
  }
}

/// Marks the task finished when dropped, so a panicking action still settles
/// its handle.
struct Finish<'a>(&'a TaskCore);

impl Drop for Finish<'_> {
  fn drop(&mut self) {
    self.0.state.store(FINISHED, Ordering::Release);
    self.0.waker.wake();
  }
}

/// The runnable half of a task. It travels through the dispatch queue; the
/// matching [`TaskHandle`] stays with whoever scheduled it.
pub(crate) struct ScheduledTask(Arc<TaskCore>);

impl ScheduledTask {
  pub(crate) fn new(action: Action) -> (ScheduledTask, TaskHandle) {
    let core = TaskCore::with_state(PENDING, Some(action));
    (ScheduledTask(core.clone()), TaskHandle(core))
  }

  /// Run the action unless the task was cancelled first. Cancellation after
  /// this point has no effect.
  pub(crate) fn run(self) {
    if !self.0.transition(PENDING, RUNNING) {
      return;
    }
    let _finish = Finish(&self.0);
    if let Some(action) = self.0.take_action() {
      action();
    }
  }
}

impl Drop for ScheduledTask {
  // A task dropped unrun (dispatch loop gone) counts as cancelled.
  fn drop(&mut self) { self.0.cancel(); }
}

/// Handle to a task scheduled through a [`Worker`](super::Worker).
///
/// Disposing the handle cancels the task if it has not started yet. The
/// handle is also a future that resolves to the task's terminal
/// [`TaskStatus`].
#[derive(Clone)]
pub struct TaskHandle(Arc<TaskCore>);

impl TaskHandle {
  pub(crate) fn rejected() -> Self { TaskHandle(TaskCore::with_state(REJECTED, None)) }

  /// Cancel the task. Returns `true` if this call prevented it from running.
  pub fn cancel(&self) -> bool { self.0.cancel() }

  pub fn status(&self) -> TaskStatus { TaskStatus::from_raw(self.0.state.load(Ordering::Acquire)) }
}

impl std::fmt::Debug for TaskHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskHandle").field("status", &self.status()).finish()
  }
}

impl Disposable for TaskHandle {
  #[inline]
  fn dispose(&self) { self.cancel(); }

  #[inline]
  fn is_disposed(&self) -> bool { self.status() != TaskStatus::Pending }
}

impl Future for TaskHandle {
  type Output = TaskStatus;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let status = self.status();
    if status.is_terminal() {
      return Poll::Ready(status);
    }
    self.0.waker.register(cx.waker());
    let status = self.status();
    if status.is_terminal() {
      Poll::Ready(status)
    } else {
      Poll::Pending
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  fn counting(counter: &Arc<AtomicUsize>) -> Action {
    let counter = counter.clone();
    Box::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
    })
  }

  #[test]
  fn run_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let (task, handle) = ScheduledTask::new(counting(&counter));
    assert_eq!(handle.status(), TaskStatus::Pending);
    task.run();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(handle.status(), TaskStatus::Finished);
    assert!(handle.is_disposed());
    assert!(!handle.cancel());
  }

  #[test]
  fn cancel_before_start_prevents_run() {
    let counter = Arc::new(AtomicUsize::new(0));
    let (task, handle) = ScheduledTask::new(counting(&counter));
    assert!(handle.cancel());
    assert!(!handle.cancel());
    task.run();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(handle.status(), TaskStatus::Cancelled);
  }

  #[test]
  fn cancel_while_running_has_no_effect() {
    let slot: Arc<Mutex<Option<TaskHandle>>> = Arc::default();
    let seen = Arc::new(Mutex::new(None));
    let (c_slot, c_seen) = (slot.clone(), seen.clone());
    let (task, handle) = ScheduledTask::new(Box::new(move || {
      let handle = c_slot.lock().unwrap().clone().unwrap();
      *c_seen.lock().unwrap() = Some((handle.cancel(), handle.status()));
    }));
    *slot.lock().unwrap() = Some(handle.clone());
    task.run();
    assert_eq!(*seen.lock().unwrap(), Some((false, TaskStatus::Running)));
    assert_eq!(handle.status(), TaskStatus::Finished);
  }

  #[test]
  fn dropped_task_counts_as_cancelled() {
    let counter = Arc::new(AtomicUsize::new(0));
    let (task, handle) = ScheduledTask::new(counting(&counter));
    drop(task);
    assert_eq!(handle.status(), TaskStatus::Cancelled);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn panicking_task_still_finishes() {
    let (task, handle) = ScheduledTask::new(Box::new(|| panic!("task failed")));
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run()));
    assert!(res.is_err());
    assert_eq!(handle.status(), TaskStatus::Finished);
  }

  #[test]
  fn handle_resolves_as_future() {
    let (task, handle) = ScheduledTask::new(Box::new(|| {}));
    let waiter = std::thread::spawn(move || futures::executor::block_on(handle));
    task.run();
    assert_eq!(waiter.join().unwrap(), TaskStatus::Finished);

    assert_eq!(futures::executor::block_on(TaskHandle::rejected()), TaskStatus::Rejected);
  }
}
