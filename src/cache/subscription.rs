//! Subscriber registry types and the handle returned by `subscribe`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::traits::QuerySnapshot;

pub(crate) type Callback<T> = dyn Fn(&QuerySnapshot<T>) + Send + Sync;

/// A registered callback on one cache entry.
pub(crate) struct Listener<T> {
  pub(crate) id: u64,
  active: Arc<AtomicBool>,
  callback: Arc<Callback<T>>,
}

impl<T> Clone for Listener<T> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      active: Arc::clone(&self.active),
      callback: Arc::clone(&self.callback),
    }
  }
}

impl<T> Listener<T> {
  pub(crate) fn new(id: u64, active: Arc<AtomicBool>, callback: Arc<Callback<T>>) -> Self {
    Self {
      id,
      active,
      callback,
    }
  }

  /// Invoke the callback unless its subscription was cancelled.
  pub(crate) fn notify(&self, snapshot: &QuerySnapshot<T>) {
    if self.active.load(Ordering::Acquire) {
      (self.callback)(snapshot);
    }
  }
}

/// Deliver one snapshot to every listener. Must be called without the cache lock held.
pub(crate) fn notify_all<T>(listeners: &[Listener<T>], snapshot: &QuerySnapshot<T>) {
  for listener in listeners {
    listener.notify(snapshot);
  }
}

/// Handle for a registered callback.
///
/// Calling [`Subscription::unsubscribe`] or dropping the handle removes the
/// callback; it is never invoked afterwards.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
  active: Arc<AtomicBool>,
  detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
  pub(crate) fn new(active: Arc<AtomicBool>, detach: Box<dyn FnOnce() + Send>) -> Self {
    Self {
      active,
      detach: Some(detach),
    }
  }

  pub fn unsubscribe(mut self) {
    self.cancel();
  }

  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::Acquire)
  }

  fn cancel(&mut self) {
    // Flip the flag first so a notification already in progress is skipped.
    self.active.store(false, Ordering::Release);
    if let Some(detach) = self.detach.take() {
      detach();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.cancel();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("active", &self.is_active())
      .finish_non_exhaustive()
  }
}
