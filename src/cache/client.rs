//! In-memory query cache with stale-while-revalidate reads and request coalescing.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use super::subscription::{notify_all, Listener, Subscription};
use super::traits::{Cacheable, QueryKey, QuerySnapshot, QueryStatus};
use crate::error::{Error, Result};

/// Fetches the full collection for a key from the system of record.
pub trait QueryFn<K, T>: Send + Sync + 'static {
  fn fetch(&self, key: &K) -> BoxFuture<'static, Result<Vec<T>>>;
}

impl<K, T, F, Fut> QueryFn<K, T> for F
where
  F: Fn(&K) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
  fn fetch(&self, key: &K) -> BoxFuture<'static, Result<Vec<T>>> {
    Box::pin(self(key))
  }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
  /// How long before cached data is considered stale
  pub stale_time: Duration,
  pub retry: RetryPolicy,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(30),
      retry: RetryPolicy::default(),
    }
  }
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<Vec<T>>>>>;

struct Entry<T> {
  data: Option<Arc<Vec<T>>>,
  updated_at: Option<Instant>,
  error: Option<Error>,
  error_at: Option<Instant>,
  invalidated: bool,
  /// Bumped by every local write and invalidation. A fetch that observes a
  /// different revision on completion must not overwrite existing data.
  revision: u64,
  in_flight: Option<SharedFetch<T>>,
  listeners: Vec<Listener<T>>,
}

impl<T> Default for Entry<T> {
  fn default() -> Self {
    Self {
      data: None,
      updated_at: None,
      error: None,
      error_at: None,
      invalidated: false,
      revision: 0,
      in_flight: None,
      listeners: Vec::new(),
    }
  }
}

impl<T> Entry<T> {
  fn snapshot(&self) -> QuerySnapshot<T> {
    let status = if self.error.is_some() {
      QueryStatus::Error
    } else if self.data.is_some() {
      QueryStatus::Success
    } else {
      QueryStatus::Pending
    };
    QuerySnapshot {
      data: self.data.clone(),
      status,
      error: self.error.clone(),
      is_fetching: self.in_flight.is_some(),
      updated_at: self.updated_at,
    }
  }

  fn has_fresh_data(&self, now: Instant, stale_time: Duration) -> bool {
    self.data.is_some()
      && !self.invalidated
      && self
        .updated_at
        .map(|at| now - at <= stale_time)
        .unwrap_or(false)
  }

  /// Whether a plain read should start a background fetch.
  ///
  /// A recent failure counts as an attempt, so a consumer that reads on every
  /// notification does not spin on a persistently failing store.
  fn should_fetch(&self, now: Instant, stale_time: Duration) -> bool {
    if self.in_flight.is_some() {
      return false;
    }
    if self.invalidated {
      return true;
    }
    let last_attempt = match (self.updated_at, self.error_at) {
      (Some(a), Some(b)) => Some(a.max(b)),
      (a, b) => a.or(b),
    };
    match last_attempt {
      Some(at) => now - at > stale_time,
      None => true,
    }
  }

  fn mark_written(&mut self, data: Vec<T>) {
    self.data = Some(Arc::new(data));
    self.updated_at = Some(Instant::now());
    self.revision += 1;
  }
}

struct Inner<K, T> {
  entries: Mutex<HashMap<K, Entry<T>>>,
  query_fn: Box<dyn QueryFn<K, T>>,
  options: CacheOptions,
  next_listener: AtomicU64,
}

/// Pending notification collected under the lock and delivered after it is released.
struct Notice<T> {
  listeners: Vec<Listener<T>>,
  snapshot: QuerySnapshot<T>,
}

impl<T> Notice<T> {
  fn of(entry: &Entry<T>) -> Self {
    Self {
      listeners: entry.listeners.clone(),
      snapshot: entry.snapshot(),
    }
  }

  fn deliver(self) -> QuerySnapshot<T> {
    notify_all(&self.listeners, &self.snapshot);
    self.snapshot
  }
}

impl<K: QueryKey, T: Cacheable> Inner<K, T> {
  fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<T>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register a new in-flight fetch on `entry` and drive it on a background task.
  ///
  /// The task owns the fetch, so its result lands in the cache even if every
  /// consumer unsubscribes before it resolves.
  fn start_fetch<'e>(self: &Arc<Self>, key: &K, entry: &'e mut Entry<T>) -> &'e SharedFetch<T> {
    debug!("fetching {}", key.description());
    let inner = Arc::clone(self);
    let key = key.clone();
    let fetch = async move {
      let revision = inner.begin_fetch(&key);
      let what = format!("fetch {}", key.description());
      let result = inner
        .options
        .retry
        .run(&what, || inner.query_fn.fetch(&key))
        .await
        .map(Arc::new);
      inner.finish_fetch(&key, revision, &result);
      result
    }
    .boxed()
    .shared();

    tokio::spawn(fetch.clone());
    entry.in_flight.insert(fetch)
  }

  /// Called when the fetch first runs: everything invalidated before this
  /// point is covered by the request about to be sent.
  fn begin_fetch(&self, key: &K) -> u64 {
    let mut entries = self.lock();
    match entries.get_mut(key) {
      Some(entry) => {
        entry.invalidated = false;
        entry.revision
      }
      None => 0,
    }
  }

  fn finish_fetch(self: &Arc<Self>, key: &K, revision: u64, result: &Result<Arc<Vec<T>>>) {
    let notice = {
      let mut entries = self.lock();
      let Some(entry) = entries.get_mut(key) else {
        // Removed while in flight
        return;
      };
      entry.in_flight = None;
      let superseded = entry.revision != revision;

      match result {
        Ok(rows) => {
          if superseded && entry.data.is_some() {
            debug!(
              "discarding {} {} rows for {}: written locally during fetch",
              rows.len(),
              T::entity_type(),
              key.description()
            );
          } else {
            entry.data = Some(Arc::clone(rows));
            entry.updated_at = Some(Instant::now());
          }
          entry.error = None;
          entry.error_at = None;
        }
        Err(e) => {
          warn!("fetch {} failed: {}", key.description(), e);
          entry.error = Some(e.clone());
          entry.error_at = Some(Instant::now());
        }
      }

      if entry.invalidated && !entry.listeners.is_empty() {
        self.start_fetch(key, entry);
      }
      Notice::of(entry)
    };
    notice.deliver();
  }

  fn detach(&self, key: &K, id: u64) {
    let mut entries = self.lock();
    if let Some(entry) = entries.get_mut(key) {
      entry.listeners.retain(|l| l.id != id);
    }
  }
}

/// Keyed in-memory cache of entity collections.
///
/// A `QueryClient` is an explicit, cheaply clonable handle; every clone shares
/// the same entries. Construct one per application (or per test) and inject it
/// into the consumers that need it.
///
/// Reads that start a fetch spawn a Tokio task, so they must run inside a
/// Tokio runtime.
pub struct QueryClient<K, T> {
  inner: Arc<Inner<K, T>>,
}

impl<K, T> Clone for QueryClient<K, T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<K: QueryKey, T: Cacheable> QueryClient<K, T> {
  pub fn new(query_fn: impl QueryFn<K, T>, options: CacheOptions) -> Self {
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        query_fn: Box::new(query_fn),
        options,
        next_listener: AtomicU64::new(0),
      }),
    }
  }

  pub fn options(&self) -> &CacheOptions {
    &self.inner.options
  }

  /// Current snapshot for `key`.
  ///
  /// Starts a background fetch when data is missing, invalidated or stale,
  /// but always returns what is cached right now.
  pub fn get(&self, key: &K) -> QuerySnapshot<T> {
    let (snapshot, notice) = {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();
      if entry.should_fetch(Instant::now(), self.inner.options.stale_time) {
        self.inner.start_fetch(key, entry);
        (entry.snapshot(), Some(Notice::of(entry)))
      } else {
        (entry.snapshot(), None)
      }
    };
    if let Some(notice) = notice {
      notice.deliver();
    }
    snapshot
  }

  /// Current snapshot for `key` without starting any fetch.
  pub fn peek(&self, key: &K) -> QuerySnapshot<T> {
    let entries = self.inner.lock();
    entries
      .get(key)
      .map(Entry::snapshot)
      .unwrap_or_else(|| QuerySnapshot {
        status: QueryStatus::Pending,
        ..QuerySnapshot::disabled()
      })
  }

  /// Resolve with fresh data, joining or starting a fetch when needed.
  pub async fn fetch_query(&self, key: &K) -> Result<Arc<Vec<T>>> {
    self.load(key, false).await
  }

  /// Fetch `key` from the store even if the cached data is fresh.
  /// Joins a fetch that is already in flight.
  pub async fn refetch(&self, key: &K) -> Result<Arc<Vec<T>>> {
    self.load(key, true).await
  }

  async fn load(&self, key: &K, force: bool) -> Result<Arc<Vec<T>>> {
    let (fetch, notice) = {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();
      if let Some(fetch) = entry.in_flight.clone() {
        (fetch, None)
      } else {
        if !force && entry.has_fresh_data(Instant::now(), self.inner.options.stale_time) {
          if let Some(data) = &entry.data {
            return Ok(Arc::clone(data));
          }
        }
        let fetch = self.inner.start_fetch(key, entry).clone();
        (fetch, Some(Notice::of(entry)))
      }
    };
    if let Some(notice) = notice {
      notice.deliver();
    }
    fetch.await
  }

  /// Overwrite the collection for `key` with authoritative data.
  pub fn set(&self, key: &K, data: Vec<T>) {
    let notice = {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();
      entry.mark_written(data);
      entry.invalidated = false;
      entry.error = None;
      entry.error_at = None;
      Notice::of(entry)
    };
    notice.deliver();
  }

  /// Read-modify-write of the cached collection.
  ///
  /// `f` receives the current rows (`None` if nothing is cached) and returns
  /// the replacement, or `None` to leave the entry untouched. Returns the
  /// collection that was cached before the call.
  pub fn update<F>(&self, key: &K, f: F) -> Option<Arc<Vec<T>>>
  where
    F: FnOnce(Option<&[T]>) -> Option<Vec<T>>,
  {
    let (previous, notice) = {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();
      let previous = entry.data.clone();
      match f(previous.as_deref().map(Vec::as_slice)) {
        Some(next) => {
          entry.mark_written(next);
          (previous, Some(Notice::of(entry)))
        }
        None => (previous, None),
      }
    };
    if let Some(notice) = notice {
      notice.deliver();
    }
    previous
  }

  /// Like [`QueryClient::update`], but never creates an entry: `f` only runs
  /// when `key` is already cached with data.
  pub fn update_existing<F>(&self, key: &K, f: F) -> Option<Arc<Vec<T>>>
  where
    F: FnOnce(&[T]) -> Option<Vec<T>>,
  {
    let (previous, notice) = {
      let mut entries = self.inner.lock();
      let entry = entries.get_mut(key)?;
      let previous = entry.data.clone()?;
      match f(previous.as_slice()) {
        Some(next) => {
          entry.mark_written(next);
          (previous, Some(Notice::of(entry)))
        }
        None => (previous, None),
      }
    };
    if let Some(notice) = notice {
      notice.deliver();
    }
    Some(previous)
  }

  /// Mark `key` stale regardless of its age.
  ///
  /// Entries with subscribers refetch right away; others refetch on the next
  /// read. Repeating the call before that fetch runs has no further effect.
  pub fn invalidate(&self, key: &K) {
    let notice = {
      let mut entries = self.inner.lock();
      let Some(entry) = entries.get_mut(key) else {
        return;
      };
      if !entry.invalidated {
        entry.invalidated = true;
        entry.revision += 1;
      }
      if entry.in_flight.is_none() && !entry.listeners.is_empty() {
        self.inner.start_fetch(key, entry);
        Some(Notice::of(entry))
      } else {
        None
      }
    };
    if let Some(notice) = notice {
      notice.deliver();
    }
  }

  /// Register `callback` for every change of the entry for `key`.
  pub fn subscribe<F>(&self, key: &K, callback: F) -> Subscription
  where
    F: Fn(&QuerySnapshot<T>) + Send + Sync + 'static,
  {
    let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
    let active = Arc::new(AtomicBool::new(true));
    {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();
      entry
        .listeners
        .push(Listener::new(id, Arc::clone(&active), Arc::new(callback)));
    }

    let weak = Arc::downgrade(&self.inner);
    let key = key.clone();
    Subscription::new(
      active,
      Box::new(move || {
        if let Some(inner) = weak.upgrade() {
          inner.detach(&key, id);
        }
      }),
    )
  }

  pub fn subscriber_count(&self, key: &K) -> usize {
    self
      .inner
      .lock()
      .get(key)
      .map(|e| e.listeners.len())
      .unwrap_or(0)
  }

  /// Keys currently held by the cache.
  pub fn keys(&self) -> Vec<K> {
    self.inner.lock().keys().cloned().collect()
  }

  /// Drop the entry for `key` along with its subscribers.
  pub fn remove(&self, key: &K) {
    if self.inner.lock().remove(key).is_some() {
      debug!("removed {}", key.description());
    }
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self.inner.lock().clear();
  }
}

impl<K, T> std::fmt::Debug for QueryClient<K, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryClient")
      .field("options", &self.inner.options)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{DateTime, Utc};
  use std::sync::atomic::AtomicUsize;
  use tokio::sync::Notify;

  #[derive(Debug, Clone, PartialEq)]
  struct Item(&'static str);

  impl Cacheable for Item {
    fn cache_key(&self) -> &str {
      self.0
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
      None
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  struct Key(&'static str);

  impl QueryKey for Key {
    fn description(&self) -> String {
      format!("items:{}", self.0)
    }
  }

  const KEY: Key = Key("a");

  fn options() -> CacheOptions {
    CacheOptions {
      stale_time: Duration::from_secs(30),
      retry: RetryPolicy::none(),
    }
  }

  /// Client whose fetcher counts calls and returns `rows`.
  fn counting_client(
    rows: Vec<Item>,
    options: CacheOptions,
  ) -> (QueryClient<Key, Item>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let client = QueryClient::new(
      move |_key: &Key| {
        counter.fetch_add(1, Ordering::SeqCst);
        let rows = rows.clone();
        async move { Ok::<_, Error>(rows) }
      },
      options,
    );
    (client, calls)
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_fetch() {
    let (client, calls) = counting_client(vec![Item("x")], options());

    let first = client.get(&KEY);
    let second = client.get(&KEY);
    assert!(first.is_loading());
    assert!(second.is_fetching);

    let (a, b) = tokio::join!(client.fetch_query(&KEY), client.fetch_query(&KEY));
    assert_eq!(a.unwrap().as_slice(), &[Item("x")]);
    assert_eq!(b.unwrap().as_slice(), &[Item("x")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_data_is_served_without_fetching() {
    let (client, calls) = counting_client(vec![Item("server")], options());

    client.set(&KEY, vec![Item("local")]);
    tokio::time::advance(Duration::from_secs(10)).await;

    let snapshot = client.get(&KEY);
    assert_eq!(snapshot.rows(), &[Item("local")]);
    assert!(!snapshot.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_read_returns_old_data_and_fetches_once() {
    let (client, calls) = counting_client(vec![Item("server")], options());

    client.set(&KEY, vec![Item("local")]);
    tokio::time::advance(Duration::from_secs(31)).await;

    let first = client.get(&KEY);
    let second = client.get(&KEY);
    assert_eq!(first.rows(), &[Item("local")]);
    assert!(first.is_fetching);
    assert_eq!(second.rows(), &[Item("local")]);

    let rows = client.fetch_query(&KEY).await.unwrap();
    assert_eq!(rows.as_slice(), &[Item("server")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_failed_refetch_keeps_previous_data() {
    let fail = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fail);
    let client: QueryClient<Key, Item> = QueryClient::new(
      move |_key: &Key| {
        let fail = flag.load(Ordering::SeqCst);
        async move {
          if fail {
            Err(Error::Network("offline".into()))
          } else {
            Ok(vec![Item("x")])
          }
        }
      },
      options(),
    );

    client.fetch_query(&KEY).await.unwrap();
    fail.store(true, Ordering::SeqCst);

    let err = client.refetch(&KEY).await.unwrap_err();
    assert_eq!(err, Error::Network("offline".into()));

    let snapshot = client.get(&KEY);
    assert!(snapshot.is_error());
    assert_eq!(snapshot.rows(), &[Item("x")]);
    assert!(!snapshot.is_fetching);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reads_retry_before_surfacing_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let client: QueryClient<Key, Item> = QueryClient::new(
      move |_key: &Key| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
          if n < 2 {
            Err(Error::Network("flaky".into()))
          } else {
            Ok(vec![Item("x")])
          }
        }
      },
      CacheOptions::default(),
    );

    let rows = client.fetch_query(&KEY).await.unwrap();
    assert_eq!(rows.as_slice(), &[Item("x")]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(client.get(&KEY).is_success());
  }

  #[tokio::test]
  async fn test_recent_failure_does_not_refetch_on_read() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let client: QueryClient<Key, Item> = QueryClient::new(
      move |_key: &Key| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err::<Vec<Item>, _>(Error::Network("down".into())) }
      },
      options(),
    );

    assert!(client.fetch_query(&KEY).await.is_err());
    let snapshot = client.get(&KEY);
    assert!(snapshot.is_error());
    assert!(!snapshot.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_double_invalidate_fetches_once() {
    let (client, calls) = counting_client(vec![Item("x")], options());
    client.fetch_query(&KEY).await.unwrap();

    let _sub = client.subscribe(&KEY, |_| {});
    client.invalidate(&KEY);
    client.invalidate(&KEY);

    client.fetch_query(&KEY).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!client.get(&KEY).is_fetching);
  }

  #[tokio::test]
  async fn test_invalidate_without_subscribers_waits_for_next_read() {
    let (client, calls) = counting_client(vec![Item("x")], options());
    client.fetch_query(&KEY).await.unwrap();

    client.invalidate(&KEY);
    client.invalidate(&KEY);
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(client.get(&KEY).is_fetching);
    client.fetch_query(&KEY).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_local_write_during_fetch_is_not_overwritten() {
    let gate = Arc::new(Notify::new());
    let release = Arc::clone(&gate);
    let client: QueryClient<Key, Item> = QueryClient::new(
      move |_key: &Key| {
        let gate = Arc::clone(&release);
        async move {
          gate.notified().await;
          Ok::<_, Error>(vec![Item("old")])
        }
      },
      options(),
    );

    client.set(&KEY, vec![Item("seed")]);
    let pending = client.refetch(&KEY);
    tokio::pin!(pending);

    // Let the fetch start and park on the gate.
    assert!(futures::poll!(pending.as_mut()).is_pending());
    client.update(&KEY, |_| Some(vec![Item("new")]));
    gate.notify_one();

    let fetched = pending.await.unwrap();
    assert_eq!(fetched.as_slice(), &[Item("old")]);
    assert_eq!(client.peek(&KEY).rows(), &[Item("new")]);
  }

  #[tokio::test]
  async fn test_subscribers_see_fetch_transitions() {
    let (client, _calls) = counting_client(vec![Item("x")], options());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let _sub = client.subscribe(&KEY, move |snapshot| {
      log.lock().unwrap().push((snapshot.is_fetching, snapshot.rows().len()));
    });

    client.get(&KEY);
    client.fetch_query(&KEY).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(true, 0), (false, 1)]);
  }

  #[tokio::test]
  async fn test_no_callbacks_after_unsubscribe() {
    let (client, _calls) = counting_client(vec![Item("x")], options());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let sub = client.subscribe(&KEY, move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    client.set(&KEY, vec![Item("y")]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    sub.unsubscribe();
    assert_eq!(client.subscriber_count(&KEY), 0);

    client.set(&KEY, vec![Item("z")]);
    client.invalidate(&KEY);
    client.fetch_query(&KEY).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_dropping_subscription_unsubscribes() {
    let (client, _calls) = counting_client(vec![], options());
    {
      let _sub = client.subscribe(&KEY, |_| {});
      assert_eq!(client.subscriber_count(&KEY), 1);
    }
    assert_eq!(client.subscriber_count(&KEY), 0);
  }

  #[tokio::test]
  async fn test_fetch_completes_after_consumer_leaves() {
    let (client, calls) = counting_client(vec![Item("x")], options());
    let sub = client.subscribe(&KEY, |_| {});
    client.get(&KEY);
    sub.unsubscribe();

    client.fetch_query(&KEY).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.peek(&KEY).rows(), &[Item("x")]);
  }

  #[tokio::test]
  async fn test_isolated_clients_do_not_share_entries() {
    let (a, _) = counting_client(vec![], options());
    let (b, _) = counting_client(vec![], options());
    a.set(&KEY, vec![Item("only-a")]);
    assert!(b.peek(&KEY).data.is_none());
  }

  #[tokio::test]
  async fn test_update_returns_previous_and_skips_on_none() {
    let (client, _) = counting_client(vec![], options());
    client.set(&KEY, vec![Item("a")]);

    let previous = client.update(&KEY, |_| None);
    assert_eq!(previous.unwrap().as_slice(), &[Item("a")]);
    assert_eq!(client.peek(&KEY).rows(), &[Item("a")]);

    client.update(&KEY, |rows| {
      let mut rows = rows.unwrap_or_default().to_vec();
      rows.push(Item("b"));
      Some(rows)
    });
    assert_eq!(client.peek(&KEY).rows(), &[Item("a"), Item("b")]);
  }

  #[tokio::test]
  async fn test_update_existing_never_creates_entries() {
    let (client, _) = counting_client(vec![], options());
    assert!(client.update_existing(&KEY, |_| Some(vec![Item("x")])).is_none());
    assert!(client.keys().is_empty());

    client.set(&KEY, vec![Item("a")]);
    client.update_existing(&KEY, |rows| {
      let mut rows = rows.to_vec();
      rows.push(Item("b"));
      Some(rows)
    });
    assert_eq!(client.peek(&KEY).rows(), &[Item("a"), Item("b")]);
  }

  #[tokio::test]
  async fn test_invalidate_during_fetch_runs_one_follow_up() {
    let gate = Arc::new(Notify::new());
    let release = Arc::clone(&gate);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let client: QueryClient<Key, Item> = QueryClient::new(
      move |_key: &Key| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::clone(&release);
        async move {
          if n == 0 {
            gate.notified().await;
            Ok::<_, Error>(vec![Item("first")])
          } else {
            Ok(vec![Item("second")])
          }
        }
      },
      options(),
    );

    let _sub = client.subscribe(&KEY, |_| {});
    let pending = client.refetch(&KEY);
    tokio::pin!(pending);
    assert!(futures::poll!(pending.as_mut()).is_pending());

    client.invalidate(&KEY);
    client.invalidate(&KEY);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    pending.await.unwrap();
    let rows = client.fetch_query(&KEY).await.unwrap();
    assert_eq!(rows.as_slice(), &[Item("second")]);

    for _ in 0..5 {
      tokio::task::yield_now().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!client.peek(&KEY).is_fetching);
  }
}
