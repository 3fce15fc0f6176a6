//! Debt list access for the signed-in user.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use super::cache::DebtQueryKey;
use super::mutations::DebtMutations;
use super::types::{Debt, DebtPatch, DebtTotals, NewDebt};
use super::validate::{RequiredFields, Validator};
use crate::auth::AuthProvider;
use crate::cache::{CacheOptions, QueryClient, QueryFn, QuerySnapshot, Subscription};
use crate::error::{Error, Result};
use crate::query::QueryObserver;
use crate::remote::{RemoteStore, SelectQuery};

/// Loads a user's debts, ordered by creditor.
pub struct SelectDebts {
  store: Arc<dyn RemoteStore>,
}

impl SelectDebts {
  pub fn new(store: Arc<dyn RemoteStore>) -> Self {
    Self { store }
  }
}

impl QueryFn<DebtQueryKey, Debt> for SelectDebts {
  fn fetch(&self, key: &DebtQueryKey) -> BoxFuture<'static, Result<Vec<Debt>>> {
    let store = Arc::clone(&self.store);
    let query = SelectQuery::owned_by(key.owner_id());
    Box::pin(async move { store.select(&query).await })
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DebtsOptions {
  pub cache: CacheOptions,
  /// Show updates and deletes before the store confirms them
  pub optimistic: bool,
}

/// Entry point for reading and writing the current user's debts.
///
/// The list query is keyed by the signed-in user's id and is disabled while
/// nobody is signed in (or the session is still loading).
pub struct Debts {
  cache: QueryClient<DebtQueryKey, Debt>,
  auth: Arc<dyn AuthProvider>,
  mutations: DebtMutations,
}

impl Debts {
  pub fn new(store: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>, options: DebtsOptions) -> Self {
    Self::with_validator(store, auth, Arc::new(RequiredFields), options)
  }

  pub fn with_validator(
    store: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    validator: Arc<dyn Validator>,
    options: DebtsOptions,
  ) -> Self {
    let cache = QueryClient::new(SelectDebts::new(Arc::clone(&store)), options.cache);
    let mutations = DebtMutations::new(store, Arc::clone(&auth), validator, cache.clone())
      .with_optimistic(options.optimistic);
    Self {
      cache,
      auth,
      mutations,
    }
  }

  pub fn cache(&self) -> &QueryClient<DebtQueryKey, Debt> {
    &self.cache
  }

  /// Key of the current user's list, if anyone is signed in.
  pub fn key(&self) -> Option<DebtQueryKey> {
    let state = self.auth.state();
    if state.loading {
      return None;
    }
    state.user.map(|user| DebtQueryKey::list(user.id))
  }

  fn require_key(&self) -> Result<DebtQueryKey> {
    self.key().ok_or(Error::Unauthenticated)
  }

  /// Snapshot of the list, starting a background fetch when it is stale.
  pub fn query(&self) -> QuerySnapshot<Debt> {
    match self.key() {
      Some(key) => self.cache.get(&key),
      None => QuerySnapshot::disabled(),
    }
  }

  /// Resolve the list, fetching it if the cached copy is not fresh.
  pub async fn fetch(&self) -> Result<Arc<Vec<Debt>>> {
    let key = self.require_key()?;
    self.cache.fetch_query(&key).await
  }

  pub async fn refetch(&self) -> Result<Arc<Vec<Debt>>> {
    let key = self.require_key()?;
    self.cache.refetch(&key).await
  }

  /// Call `callback` on every change of the list and load it if needed.
  pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
  where
    F: Fn(&QuerySnapshot<Debt>) + Send + Sync + 'static,
  {
    let key = self.require_key()?;
    let subscription = self.cache.subscribe(&key, callback);
    self.cache.get(&key);
    Ok(subscription)
  }

  pub fn observe(&self) -> Result<QueryObserver<DebtQueryKey, Debt>> {
    let key = self.require_key()?;
    Ok(QueryObserver::new(self.cache.clone(), key))
  }

  pub async fn create(&self, new: NewDebt) -> Result<Debt> {
    self.mutations.create(new).await
  }

  pub async fn update(&self, id: &str, patch: DebtPatch) -> Result<Debt> {
    self.mutations.update(id, patch).await
  }

  pub async fn delete(&self, id: &str) -> Result<()> {
    self.mutations.delete(id).await
  }

  /// Totals over the cached list.
  pub fn totals(&self) -> DebtTotals {
    DebtTotals::from_debts(self.query().rows())
  }

  /// Drop the previous user's cached list whenever the session ends or
  /// switches to another user.
  pub fn watch_session(&self) -> JoinHandle<()> {
    let mut rx = self.auth.watch();
    let cache = self.cache.clone();
    tokio::spawn(async move {
      let mut current = rx.borrow_and_update().user.as_ref().map(|u| u.id.clone());
      while rx.changed().await.is_ok() {
        let next = rx.borrow_and_update().user.as_ref().map(|u| u.id.clone());
        if next == current {
          continue;
        }
        if let Some(previous) = current.take() {
          info!("session for {} ended, dropping cached debts", previous);
          cache.remove(&DebtQueryKey::list(previous));
        }
        current = next;
      }
    })
  }
}

impl std::fmt::Debug for Debts {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Debts")
      .field("cache", &self.cache)
      .field("user", &self.auth.current_user())
      .finish_non_exhaustive()
  }
}
