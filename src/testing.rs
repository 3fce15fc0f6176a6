//! Test doubles shared by unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

use crate::auth::User;
use crate::debts::{Debt, DebtInsert, DebtPatch};
use crate::error::{Error, Result};
use crate::remote::{MemoryStore, RemoteStore, SelectQuery};

pub(crate) fn user(id: &str) -> User {
  User {
    id: id.to_string(),
    email: format!("{}@example.com", id),
  }
}

/// Holds a store response back until released.
#[derive(Default)]
pub(crate) struct Gate {
  held: AtomicBool,
  notify: Notify,
}

impl Gate {
  pub fn hold(&self) {
    self.held.store(true, Ordering::SeqCst);
  }

  pub fn release(&self) {
    self.held.store(false, Ordering::SeqCst);
    self.notify.notify_one();
  }

  async fn pass(&self) {
    if self.held.load(Ordering::SeqCst) {
      self.notify.notified().await;
    }
  }
}

/// [`MemoryStore`] that counts calls and fails on demand.
///
/// Gated writes are applied to the inner store right away; only the response
/// waits for the gate.
#[derive(Default)]
pub(crate) struct FlakyStore {
  pub inner: MemoryStore,
  pub selects: AtomicUsize,
  pub inserts: AtomicUsize,
  pub updates: AtomicUsize,
  pub deletes: AtomicUsize,
  pub fail_reads: AtomicBool,
  pub fail_writes: AtomicBool,
  pub insert_gate: Gate,
  pub update_gate: Gate,
  pub delete_gate: Gate,
  last_patch: Mutex<Option<DebtPatch>>,
}

impl FlakyStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Patch passed to the most recent update.
  pub fn last_patch(&self) -> Option<DebtPatch> {
    self
      .last_patch
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn check(&self, flag: &AtomicBool) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
      return Err(Error::Network("connection refused".to_string()));
    }
    Ok(())
  }
}

#[async_trait]
impl RemoteStore for FlakyStore {
  async fn select(&self, query: &SelectQuery) -> Result<Vec<Debt>> {
    self.selects.fetch_add(1, Ordering::SeqCst);
    self.check(&self.fail_reads)?;
    self.inner.select(query).await
  }

  async fn insert(&self, row: &DebtInsert) -> Result<Debt> {
    self.inserts.fetch_add(1, Ordering::SeqCst);
    self.check(&self.fail_writes)?;
    let result = self.inner.insert(row).await;
    self.insert_gate.pass().await;
    result
  }

  async fn update(&self, id: &str, owner_id: &str, patch: &DebtPatch) -> Result<Option<Debt>> {
    self.updates.fetch_add(1, Ordering::SeqCst);
    *self.last_patch.lock().unwrap_or_else(PoisonError::into_inner) = Some(patch.clone());
    self.check(&self.fail_writes)?;
    let result = self.inner.update(id, owner_id, patch).await;
    self.update_gate.pass().await;
    result
  }

  async fn delete(&self, id: &str, owner_id: &str) -> Result<u64> {
    self.deletes.fetch_add(1, Ordering::SeqCst);
    self.check(&self.fail_writes)?;
    let result = self.inner.delete(id, owner_id).await;
    self.delete_gate.pass().await;
    result
  }
}
