//! Poll-friendly consumer handle over a cache entry.
//!
//! A `QueryObserver` subscribes to one key and buffers every change, so an
//! event loop can check for new state on each tick without registering
//! callbacks of its own.
//!
//! # Example
//!
//! ```ignore
//! let mut observer = debts.observe()?;
//!
//! // In event loop tick
//! if observer.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! let state = observer.state();
//! if state.is_loading() {
//!     render_spinner();
//! } else {
//!     render_rows(state.rows());
//! }
//! ```

use tokio::sync::mpsc;

use crate::cache::{Cacheable, QueryClient, QueryKey, QuerySnapshot, Subscription};

/// Observer of a single query key.
///
/// Dropping the observer unsubscribes it.
pub struct QueryObserver<K, T> {
  client: QueryClient<K, T>,
  key: K,
  state: QuerySnapshot<T>,
  receiver: mpsc::UnboundedReceiver<QuerySnapshot<T>>,
  _subscription: Subscription,
}

impl<K: QueryKey, T: Cacheable> QueryObserver<K, T> {
  /// Subscribe to `key` and read it once, starting a fetch if needed.
  pub fn new(client: QueryClient<K, T>, key: K) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = client.subscribe(&key, move |snapshot| {
      // Ignore send errors - observer may be shutting down
      let _ = tx.send(snapshot.clone());
    });
    let state = client.get(&key);
    let mut receiver = rx;
    // `state` already reflects anything delivered during the initial read
    while receiver.try_recv().is_ok() {}
    Self {
      client,
      key,
      state,
      receiver,
      _subscription: subscription,
    }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  /// Latest state seen by this observer.
  pub fn state(&self) -> &QuerySnapshot<T> {
    &self.state
  }

  /// Rows of the latest state (empty while nothing is cached).
  pub fn rows(&self) -> &[T] {
    self.state.rows()
  }

  /// Check for state changes without blocking.
  ///
  /// Returns `true` if the state changed since the last call.
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(snapshot) = self.receiver.try_recv() {
      self.state = snapshot;
      changed = true;
    }
    changed
  }

  /// Wait for the next change and return the new state.
  pub async fn changed(&mut self) -> &QuerySnapshot<T> {
    if let Some(snapshot) = self.receiver.recv().await {
      self.state = snapshot;
      self.poll();
    }
    &self.state
  }

  /// Re-read the entry, starting a background fetch if it went stale.
  pub fn refresh(&mut self) -> &QuerySnapshot<T> {
    self.poll();
    self.state = self.client.get(&self.key);
    &self.state
  }
}

impl<K: std::fmt::Debug, T: std::fmt::Debug> std::fmt::Debug for QueryObserver<K, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryObserver")
      .field("key", &self.key)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheOptions, RetryPolicy};
  use crate::error::Error;
  use chrono::{DateTime, Utc};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[derive(Debug, Clone, PartialEq)]
  struct Row(u32);

  impl Cacheable for Row {
    fn cache_key(&self) -> &str {
      "row"
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
      None
    }

    fn entity_type() -> &'static str {
      "row"
    }
  }

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  struct Rows;

  impl QueryKey for Rows {
    fn description(&self) -> String {
      "rows".to_string()
    }
  }

  fn client(counter: Arc<AtomicU32>) -> QueryClient<Rows, Row> {
    QueryClient::new(
      move |_key: &Rows| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, Error>(vec![Row(n)]) }
      },
      CacheOptions {
        stale_time: Duration::from_secs(60),
        retry: RetryPolicy::none(),
      },
    )
  }

  #[tokio::test]
  async fn test_observer_starts_loading_then_receives_data() {
    let mut observer = QueryObserver::new(client(Arc::new(AtomicU32::new(0))), Rows);
    assert!(observer.state().is_loading());

    let state = observer.changed().await;
    assert!(state.is_success());
    assert_eq!(observer.rows(), &[Row(0)]);
  }

  #[tokio::test]
  async fn test_poll_reports_changes_once() {
    let client = client(Arc::new(AtomicU32::new(0)));
    let mut observer = QueryObserver::new(client.clone(), Rows);
    client.fetch_query(&Rows).await.unwrap();

    assert!(observer.poll());
    assert!(!observer.poll());
    assert_eq!(observer.rows(), &[Row(0)]);
  }

  #[tokio::test]
  async fn test_observers_share_one_fetch() {
    let calls = Arc::new(AtomicU32::new(0));
    let client = client(Arc::clone(&calls));
    let mut first = QueryObserver::new(client.clone(), Rows);
    let mut second = QueryObserver::new(client.clone(), Rows);

    first.changed().await;
    second.poll();
    assert_eq!(first.rows(), second.rows());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_dropping_observer_unsubscribes() {
    let client = client(Arc::new(AtomicU32::new(0)));
    let observer = QueryObserver::new(client.clone(), Rows);
    assert_eq!(client.subscriber_count(&Rows), 1);
    drop(observer);
    assert_eq!(client.subscriber_count(&Rows), 0);
  }
}
