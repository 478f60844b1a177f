use std::{
  cmp::{Ordering as CmpOrdering, Reverse},
  collections::BinaryHeap,
  panic::{self, AssertUnwindSafe},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread::{self, ThreadId},
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace};

use super::{
  task::{ScheduledTask, TaskHandle},
  Instant, Worker,
};
use crate::error::{panic_message, SchedulerError};

const DEFAULT_THREAD_NAME: &str = "rx-dispatch";

enum Message {
  Run(ScheduledTask),
  RunAt(Instant, ScheduledTask),
  Shutdown,
}

struct Shared {
  name: String,
  thread: ThreadId,
  sender: Sender<Message>,
  shut_down: AtomicBool,
}

/// The single logical thread on which listener registration, event delivery
/// and listener removal are serialized.
///
/// A `DispatchScheduler` owns one event-loop thread and its task queue. The
/// handle is cheap to clone; every clone talks to the same loop. Work is
/// submitted through [`Worker`]s obtained from
/// [`create_worker`](Self::create_worker).
///
/// There is no process-wide default: build one explicitly and hand it to
/// whatever needs it.
///
/// # Example
/// ```
/// use rxbridge::prelude::*;
/// use std::sync::mpsc::channel;
///
/// let scheduler = DispatchScheduler::new().unwrap();
/// let worker = scheduler.create_worker();
/// let (tx, rx) = channel();
/// let probe = scheduler.clone();
/// worker.schedule(move || tx.send(probe.is_dispatch_thread()).unwrap());
/// assert!(rx.recv().unwrap());
/// scheduler.dispose();
/// ```
#[derive(Clone)]
pub struct DispatchScheduler {
  shared: Arc<Shared>,
}

impl DispatchScheduler {
  /// Start a dispatch loop with the default configuration.
  pub fn new() -> Result<Self, SchedulerError> { Self::builder().build() }

  pub fn builder() -> DispatchSchedulerBuilder { DispatchSchedulerBuilder::default() }

  /// Create an independent worker bound to this scheduler.
  pub fn create_worker(&self) -> Worker { Worker::new(self.clone()) }

  /// Whether the calling thread is this scheduler's dispatch thread.
  pub fn is_dispatch_thread(&self) -> bool { thread::current().id() == self.shared.thread }

  /// Name of the dispatch thread.
  pub fn name(&self) -> &str { &self.shared.name }

  /// Stop the dispatch loop. Tasks still queued are cancelled; anything
  /// scheduled afterwards is rejected without running.
  pub fn dispose(&self) {
    if self
      .shared
      .shut_down
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
    {
      debug!("shutting down dispatch loop `{}`", self.shared.name);
      let _ = self.shared.sender.send(Message::Shutdown);
    }
  }

  pub fn is_disposed(&self) -> bool { self.shared.shut_down.load(Ordering::Acquire) }

  /// Hand a task to the loop. A task that cannot be delivered is dropped,
  /// which settles its handle as cancelled.
  pub(crate) fn post(&self, task: ScheduledTask, at: Option<Instant>) {
    let message = match at {
      Some(at) => Message::RunAt(at, task),
      None => Message::Run(task),
    };
    if self.shared.sender.send(message).is_err() {
      trace!("dispatch loop `{}` is gone, dropping task", self.shared.name);
    }
  }

  pub(crate) fn reject(&self) -> TaskHandle {
    debug!("dispatch loop `{}` is shut down, task rejected", self.shared.name);
    TaskHandle::rejected()
  }
}

impl std::fmt::Debug for DispatchScheduler {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DispatchScheduler")
      .field("name", &self.shared.name)
      .field("disposed", &self.is_disposed())
      .finish()
  }
}

/// Configuration for a [`DispatchScheduler`].
#[derive(Debug, Clone)]
pub struct DispatchSchedulerBuilder {
  name: String,
  stack_size: Option<usize>,
}

impl Default for DispatchSchedulerBuilder {
  fn default() -> Self { Self { name: DEFAULT_THREAD_NAME.to_owned(), stack_size: None } }
}

impl DispatchSchedulerBuilder {
  /// Name given to the dispatch thread.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Stack size of the dispatch thread, in bytes.
  pub fn stack_size(mut self, size: usize) -> Self {
    self.stack_size = Some(size);
    self
  }

  /// Spawn the dispatch thread and return a handle to it.
  pub fn build(self) -> Result<DispatchScheduler, SchedulerError> {
    let (sender, receiver) = unbounded();
    let mut builder = thread::Builder::new().name(self.name.clone());
    if let Some(size) = self.stack_size {
      builder = builder.stack_size(size);
    }
    let name = self.name.clone();
    let handle = builder.spawn(move || DispatchLoop::new(name, receiver).run())?;
    debug!("dispatch loop `{}` started", self.name);
    Ok(DispatchScheduler {
      shared: Arc::new(Shared {
        name: self.name,
        thread: handle.thread().id(),
        sender,
        shut_down: AtomicBool::new(false),
      }),
    })
  }
}

struct Timer {
  at: Instant,
  seq: u64,
  task: ScheduledTask,
}

impl PartialEq for Timer {
  fn eq(&self, other: &Self) -> bool { self.at == other.at && self.seq == other.seq }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> { Some(self.cmp(other)) }
}

impl Ord for Timer {
  fn cmp(&self, other: &Self) -> CmpOrdering {
    self.at.cmp(&other.at).then_with(|| self.seq.cmp(&other.seq))
  }
}

struct DispatchLoop {
  name: String,
  receiver: Receiver<Message>,
  timers: BinaryHeap<Reverse<Timer>>,
  seq: u64,
}

impl DispatchLoop {
  fn new(name: String, receiver: Receiver<Message>) -> Self {
    DispatchLoop { name, receiver, timers: BinaryHeap::new(), seq: 0 }
  }

  fn run(mut self) {
    loop {
      self.fire_due_timers();
      let deadline = self.timers.peek().map(|Reverse(timer)| timer.at);
      let message = match deadline {
        Some(deadline) => match self.receiver.recv_deadline(deadline) {
          Ok(message) => message,
          Err(RecvTimeoutError::Timeout) => continue,
          Err(RecvTimeoutError::Disconnected) => break,
        },
        None => match self.receiver.recv() {
          Ok(message) => message,
          Err(_) => break,
        },
      };
      match message {
        Message::Run(task) => self.run_task(task),
        Message::RunAt(at, task) => {
          self.seq += 1;
          self.timers.push(Reverse(Timer { at, seq: self.seq, task }));
        }
        Message::Shutdown => break,
      }
    }
    let pending = self.timers.len() + self.receiver.len();
    debug!("dispatch loop `{}` stopped, cancelling {} pending task(s)", self.name, pending);
    // Dropping an unrun task settles it as cancelled.
    self.timers.clear();
    self.receiver.try_iter().for_each(drop);
  }

  fn fire_due_timers(&mut self) {
    let now = Instant::now();
    while self.timers.peek().map_or(false, |Reverse(timer)| timer.at <= now) {
      if let Some(Reverse(timer)) = self.timers.pop() {
        self.run_task(timer.task);
      }
    }
  }

  fn run_task(&self, task: ScheduledTask) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
      error!("task panicked on dispatch loop `{}`: {}", self.name, panic_message(&*payload));
    }
  }
}
