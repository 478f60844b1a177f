//! Bridge from a listener-based event target to an [`Observable`].
//!
//! Every step of a subscription's life runs on the dispatch thread: the
//! listener is registered there, the target fires it there, and it is
//! removed there. The only state touched from other threads is the
//! subscription's [`DisposeFlag`].

use std::{
  any::Any,
  collections::VecDeque,
  marker::PhantomData,
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak},
};

use log::{error, trace, warn};

use crate::{
  error::{panic_message, SourceError},
  listener::{Listener, WeakListener},
  observable::Observable,
  observer::Observer,
  scheduler::{DispatchScheduler, Worker},
  subscription::{Disposable, DisposeFlag},
};

struct Hooks<R, U, M> {
  register: R,
  unregister: U,
  map: M,
}

/// Observable over the events of one target, created by [`from_events_of`].
///
/// Cloning is cheap; every subscription gets its own listener.
pub struct FromEvent<T, P, R, U, M> {
  scheduler: DispatchScheduler,
  target: Weak<T>,
  hooks: Arc<Hooks<R, U, M>>,
  _payload: PhantomData<fn(P)>,
}

impl<T, P, R, U, M> Clone for FromEvent<T, P, R, U, M> {
  fn clone(&self) -> Self {
    FromEvent {
      scheduler: self.scheduler.clone(),
      target: self.target.clone(),
      hooks: self.hooks.clone(),
      _payload: PhantomData,
    }
  }
}

/// Observe the events `target` delivers to its listeners.
///
/// `register` and `unregister` are the target's add/remove-listener pair;
/// `map` turns a native callback payload into the emitted item. Only a weak
/// reference to `target` is kept: if it has been dropped by the time the
/// subscription registers, the observer receives
/// [`SourceError::TargetUnavailable`] instead.
///
/// All calls to `register`, `unregister` and the listener itself happen on
/// `scheduler`'s dispatch thread. The target is expected to fire its
/// listeners on that thread as well.
///
/// An event the observer causes from inside its own `next` is delivered
/// right after that `next` returns, so the observer still sees events in
/// firing order.
pub fn from_events_of<T, P, Item, R, U, M>(
  scheduler: &DispatchScheduler,
  target: &Arc<T>,
  register: R,
  unregister: U,
  map: M,
) -> FromEvent<T, P, R, U, M>
where
  R: Fn(&T, Listener<P>),
  U: Fn(&T, &Listener<P>),
  M: Fn(P) -> Item,
{
  FromEvent {
    scheduler: scheduler.clone(),
    target: Arc::downgrade(target),
    hooks: Arc::new(Hooks { register, unregister, map }),
    _payload: PhantomData,
  }
}

impl<T, P, Item, R, U, M> Observable for FromEvent<T, P, R, U, M>
where
  T: Send + Sync + 'static,
  P: Send + 'static,
  Item: 'static,
  R: Fn(&T, Listener<P>) + Send + Sync + 'static,
  U: Fn(&T, &Listener<P>) + Send + Sync + 'static,
  M: Fn(P) -> Item + Send + Sync + 'static,
{
  type Item = Item;
  type Err = SourceError;
  type Unsub = EventSubscription;

  fn actual_subscribe<O>(self, observer: O) -> EventSubscription
  where
    O: Observer<Item, SourceError> + Send + 'static,
  {
    let core = Arc::new(SourceCore {
      flag: DisposeFlag::new(),
      observer: Mutex::new(Some(observer)),
      nested: Mutex::new(VecDeque::new()),
      registered: Mutex::new(None),
      target: self.target,
      hooks: self.hooks,
      worker: self.scheduler.create_worker(),
      _payload: PhantomData,
    });
    let listener = {
      let core = core.clone();
      Listener::new(move |raw: P| core.deliver(raw))
    };
    let c_core = core.clone();
    core.worker.schedule(move || c_core.register(listener));
    EventSubscription { core }
  }
}

struct SourceCore<T, P, O, R, U, M> {
  flag: DisposeFlag,
  observer: Mutex<Option<O>>,
  // Payloads fired from inside the observer's own `next`.
  nested: Mutex<VecDeque<P>>,
  registered: Mutex<Option<WeakListener<P>>>,
  target: Weak<T>,
  hooks: Arc<Hooks<R, U, M>>,
  worker: Worker,
  _payload: PhantomData<fn(P)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, P, Item, O, R, U, M> SourceCore<T, P, O, R, U, M>
where
  T: Send + Sync + 'static,
  P: Send + 'static,
  Item: 'static,
  O: Observer<Item, SourceError> + Send + 'static,
  R: Fn(&T, Listener<P>) + Send + Sync + 'static,
  U: Fn(&T, &Listener<P>) + Send + Sync + 'static,
  M: Fn(P) -> Item + Send + Sync + 'static,
{
  fn register(self: &Arc<Self>, listener: Listener<P>) {
    if self.flag.is_disposed() {
      trace!("subscription disposed before its listener was registered");
      return;
    }
    let Some(target) = self.target.upgrade() else {
      if self.flag.dispose() {
        self.fail(SourceError::TargetUnavailable);
        self.worker.dispose();
      }
      return;
    };
    *lock(&self.registered) = Some(listener.downgrade());
    (self.hooks.register)(&target, listener);
    trace!("listener registered");
  }

  fn deliver(self: &Arc<Self>, raw: P) {
    if self.flag.is_disposed() {
      return;
    }
    let mut slot = match self.observer.try_lock() {
      Ok(slot) => slot,
      Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
      Err(TryLockError::WouldBlock) => {
        // Re-entered from the running `next`; delivered once it returns.
        lock(&self.nested).push_back(raw);
        return;
      }
    };
    let hooks = &self.hooks;
    let mut pending = Some(raw);
    while let Some(raw) = pending {
      if self.flag.is_disposed() {
        break;
      }
      let Some(observer) = slot.as_mut().filter(|o| !o.is_closed()) else {
        break;
      };
      if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer.next((hooks.map)(raw))))
      {
        let observer = slot.take();
        drop(slot);
        lock(&self.nested).clear();
        self.observer_failed(observer, payload);
        return;
      }
      pending = lock(&self.nested).pop_front();
    }
    lock(&self.nested).clear();
  }

  fn observer_failed(self: &Arc<Self>, observer: Option<O>, payload: Box<dyn Any + Send>) {
    let err = SourceError::from_panic(payload);
    warn!("{err}, disposing the subscription");
    if self.flag.dispose() {
      if let Some(observer) = observer {
        emit_error(observer, err);
      }
      self.schedule_unregister();
    }
  }

  fn fail(&self, err: SourceError) {
    let observer = lock(&self.observer).take();
    if let Some(observer) = observer {
      emit_error(observer, err);
    }
  }

  fn schedule_unregister(self: &Arc<Self>) {
    let core = self.clone();
    self.worker.schedule(move || {
      core.unregister();
      core.worker.dispose();
    });
  }

  fn unregister(&self) {
    if !release(&self.observer) {
      trace!("observer is busy, it is released with the subscription");
    }
    let Some(listener) = lock(&self.registered).take().and_then(|weak| weak.upgrade()) else {
      trace!("no listener to unregister");
      return;
    };
    if let Some(target) = self.target.upgrade() {
      (self.hooks.unregister)(&target, &listener);
      trace!("listener unregistered");
    }
  }
}

/// Drop the observer held in `slot`, if the slot can be locked right now.
///
/// Inside one of the observer's own callbacks the lock is held; the observer
/// is then released together with the core instead.
fn release<O>(slot: &Mutex<Option<O>>) -> bool {
  let observer = match slot.try_lock() {
    Ok(mut slot) => slot.take(),
    Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
    Err(TryLockError::WouldBlock) => return false,
  };
  drop(observer);
  true
}

fn emit_error<O, Item>(observer: O, err: SourceError)
where
  O: Observer<Item, SourceError>,
{
  if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer.error(err))) {
    error!("observer panicked while handling an error: {}", panic_message(&*payload));
  }
}

trait Teardown: Send + Sync {
  fn teardown(self: Arc<Self>);
  fn is_disposed(&self) -> bool;
}

impl<T, P, Item, O, R, U, M> Teardown for SourceCore<T, P, O, R, U, M>
where
  T: Send + Sync + 'static,
  P: Send + 'static,
  Item: 'static,
  O: Observer<Item, SourceError> + Send + 'static,
  R: Fn(&T, Listener<P>) + Send + Sync + 'static,
  U: Fn(&T, &Listener<P>) + Send + Sync + 'static,
  M: Fn(P) -> Item + Send + Sync + 'static,
{
  fn teardown(self: Arc<Self>) {
    if self.flag.dispose() {
      trace!("subscription disposed, scheduling listener removal");
      self.schedule_unregister();
    }
  }

  fn is_disposed(&self) -> bool { self.flag.is_disposed() }
}

/// Handle to one subscription created by [`from_events_of`].
///
/// Clones share the same subscription, so any thread holding one may
/// dispose it.
#[derive(Clone)]
pub struct EventSubscription {
  core: Arc<dyn Teardown>,
}

impl Disposable for EventSubscription {
  /// Stop the subscription. The first call marks it disposed and schedules
  /// listener removal on the dispatch thread; later calls do nothing.
  ///
  /// Called from the dispatch thread, removal happens before this returns.
  /// Called from another thread, removal happens once the dispatch thread
  /// gets to it, and a delivery already running on the dispatch thread may
  /// still finish after `dispose` returns. Delivery stops soon, not
  /// instantly.
  fn dispose(&self) { self.core.clone().teardown() }

  fn is_disposed(&self) -> bool { self.core.is_disposed() }
}

impl std::fmt::Debug for EventSubscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventSubscription").field("disposed", &self.is_disposed()).finish()
  }
}
