//! Create, update and delete debts while keeping the cached list consistent.

use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::{insert_ordered, remove, replace_if_newer, DebtQueryKey};
use super::types::{Debt, DebtPatch, NewDebt};
use super::validate::Validator;
use crate::auth::AuthProvider;
use crate::cache::QueryClient;
use crate::error::{Error, Result};
use crate::remote::RemoteStore;

/// Performs one write against the remote store and reconciles the cache.
///
/// Writes are never retried here: repeating a create would duplicate a row.
/// There is no per-record lock; concurrent writes to one id resolve as
/// last-response-wins, except that an older row never replaces a newer one in
/// the cache and a deleted row is never brought back by an update response.
pub struct DebtMutations {
  store: Arc<dyn RemoteStore>,
  auth: Arc<dyn AuthProvider>,
  validator: Arc<dyn Validator>,
  cache: QueryClient<DebtQueryKey, Debt>,
  optimistic: bool,
}

impl DebtMutations {
  pub fn new(
    store: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    validator: Arc<dyn Validator>,
    cache: QueryClient<DebtQueryKey, Debt>,
  ) -> Self {
    Self {
      store,
      auth,
      validator,
      cache,
      optimistic: false,
    }
  }

  /// Apply updates and deletes to the cache before the store confirms them.
  pub fn with_optimistic(mut self, optimistic: bool) -> Self {
    self.optimistic = optimistic;
    self
  }

  fn owner(&self) -> Result<String> {
    self
      .auth
      .current_user()
      .map(|user| user.id)
      .ok_or(Error::Unauthenticated)
  }

  /// Whether `owner` is still the signed-in user. A write that resolves after
  /// the session ended or switched must not touch the cache, which no longer
  /// holds that user's list.
  fn session_is(&self, owner: &str) -> bool {
    let current = self.auth.current_user();
    let same = current.as_ref().is_some_and(|user| user.id == owner);
    if !same {
      debug!("session changed during write, leaving cache alone");
    }
    same
  }

  /// Insert a new debt owned by the signed-in user.
  ///
  /// The returned row is added to the cached list right away; the list is
  /// then invalidated so a refetch reconciles it with the store.
  pub async fn create(&self, new: NewDebt) -> Result<Debt> {
    self.validator.validate_new(&new)?;
    let owner = self.owner()?;
    let key = DebtQueryKey::list(&owner);

    let debt = self
      .store
      .insert(&new.into_insert(&owner))
      .await
      .inspect_err(|e| warn!("create debt failed: {}", e))?;
    debug!("created debt {}", debt.id);
    if !self.session_is(&owner) {
      return Ok(debt);
    }

    self.cache.update(&key, |rows| {
      Some(insert_ordered(rows.unwrap_or_default(), debt.clone()))
    });
    self.cache.invalidate(&key);
    Ok(debt)
  }

  /// Apply `patch` to debt `id` within the signed-in user's scope.
  pub async fn update(&self, id: &str, patch: DebtPatch) -> Result<Debt> {
    let patch = patch.normalized();
    self.validator.validate_patch(&patch)?;
    let owner = self.owner()?;
    let key = DebtQueryKey::list(&owner);

    let before = if self.optimistic {
      self.preview_update(&key, id, &patch)
    } else {
      None
    };

    let result = self.store.update(id, &owner, &patch).await;
    if !self.session_is(&owner) {
      return result?.ok_or_else(|| Error::NotFound { id: id.to_string() });
    }

    match result {
      Ok(Some(debt)) => {
        debug!("updated debt {}", debt.id);
        self
          .cache
          .update_existing(&key, |rows| replace_if_newer(rows, debt.clone()));
        self.cache.invalidate(&key);
        Ok(debt)
      }
      Ok(None) => {
        self.undo(&key, before);
        Err(Error::NotFound { id: id.to_string() })
      }
      Err(e) => {
        warn!("update debt {} failed: {}", id, e);
        self.undo(&key, before);
        Err(e)
      }
    }
  }

  /// Delete debt `id` within the signed-in user's scope.
  pub async fn delete(&self, id: &str) -> Result<()> {
    let owner = self.owner()?;
    let key = DebtQueryKey::list(&owner);

    let before = if self.optimistic {
      self.preview_delete(&key, id)
    } else {
      None
    };

    let result = self.store.delete(id, &owner).await;
    if !self.session_is(&owner) {
      return match result? {
        0 => Err(Error::NotFound { id: id.to_string() }),
        _ => Ok(()),
      };
    }

    match result {
      Ok(0) => {
        self.undo(&key, before);
        Err(Error::NotFound { id: id.to_string() })
      }
      Ok(_) => {
        debug!("deleted debt {}", id);
        self.cache.update_existing(&key, |rows| remove(rows, id));
        self.cache.invalidate(&key);
        Ok(())
      }
      Err(e) => {
        warn!("delete debt {} failed: {}", id, e);
        self.undo(&key, before);
        Err(e)
      }
    }
  }

  fn cached(&self, key: &DebtQueryKey, id: &str) -> Option<Debt> {
    self
      .cache
      .peek(key)
      .rows()
      .iter()
      .find(|d| d.id == id)
      .cloned()
  }

  /// Apply `patch` to the cached row; returns the row as it was before.
  fn preview_update(&self, key: &DebtQueryKey, id: &str, patch: &DebtPatch) -> Option<Debt> {
    let before = self.cached(key, id)?;
    let preview = patch.apply_to(&before);
    self
      .cache
      .update_existing(key, |rows| Some(insert_ordered(rows, preview)));
    Some(before)
  }

  fn preview_delete(&self, key: &DebtQueryKey, id: &str) -> Option<Debt> {
    let before = self.cached(key, id)?;
    self.cache.update_existing(key, |rows| remove(rows, id));
    Some(before)
  }

  /// Put back the record an optimistic edit replaced, unless the store's
  /// data has overwritten it in the meantime.
  fn undo(&self, key: &DebtQueryKey, before: Option<Debt>) {
    let Some(before) = before else {
      return;
    };
    debug!("rolling back optimistic edit of debt {}", before.id);
    self.cache.update_existing(key, |rows| {
      match rows.iter().find(|d| d.id == before.id) {
        Some(current) if current.updated_at != before.updated_at => None,
        _ => Some(insert_ordered(rows, before.clone())),
      }
    });
    self.cache.invalidate(key);
  }
}
