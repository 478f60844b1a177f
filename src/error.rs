//! Error taxonomy
//!
//! Every failure below the observer boundary ends up in one of these types.
//! Event sources report [`SourceError`] through the observer's `error`
//! channel; [`SchedulerError`] only appears when building a scheduler.

use std::any::Any;

use thiserror::Error;

/// Failures delivered to an observer of an event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
  /// The target was already destroyed when registration ran, so no listener
  /// was registered.
  #[error("event target is no longer available")]
  TargetUnavailable,

  /// One of the observer's own callbacks panicked. The listener has been
  /// removed and no further events follow.
  #[error("observer callback failed: {0}")]
  ObserverFailure(String),
}

impl SourceError {
  /// Build an `ObserverFailure` from a caught panic payload.
  pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
    SourceError::ObserverFailure(panic_message(&*payload))
  }
}

/// Failures raised while constructing a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
  #[error("failed to spawn the dispatch thread")]
  Spawn(#[from] std::io::Error),
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(msg) = payload.downcast_ref::<&str>() {
    (*msg).to_owned()
  } else if let Some(msg) = payload.downcast_ref::<String>() {
    msg.clone()
  } else {
    "non-string panic payload".to_owned()
  }
}
