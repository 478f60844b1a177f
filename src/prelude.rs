//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Errors
pub use crate::error::{SchedulerError, SourceError};
// Widget side
pub use crate::listener::{Listener, ListenerList};
// Core traits and the event source
pub use crate::observable::{
  from_events_of, EventSubscription, FilterOp, FromEvent, Observable, ObservableExt,
};
pub use crate::observer::{FnMutObserver, Observer, ObserverAll};
// Predicates
pub use crate::ops::predicate::{of_kind, EventKind};
// Scheduler
pub use crate::scheduler::{
  DispatchScheduler, DispatchSchedulerBuilder, Duration, Instant, TaskHandle, TaskStatus, Worker,
};
// Subscription
pub use crate::subscription::*;
