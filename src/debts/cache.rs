//! Cache wiring for debt rows.

use chrono::{DateTime, Utc};

use crate::cache::{Cacheable, QueryKey};

use super::types::Debt;

// ============================================================================
// Cacheable implementation
// ============================================================================

impl Cacheable for Debt {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    Some(self.updated_at)
  }

  fn entity_type() -> &'static str {
    "debt"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query keys for debt data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DebtQueryKey {
  /// Every debt owned by a user, ordered by creditor
  List { owner_id: String },
}

impl DebtQueryKey {
  pub fn list(owner_id: impl Into<String>) -> Self {
    Self::List {
      owner_id: owner_id.into(),
    }
  }

  pub fn owner_id(&self) -> &str {
    match self {
      Self::List { owner_id } => owner_id,
    }
  }
}

impl QueryKey for DebtQueryKey {
  fn description(&self) -> String {
    match self {
      Self::List { owner_id } => format!("debts for {}", owner_id),
    }
  }
}

// ============================================================================
// Collection edits
// ============================================================================

/// Insert `debt` keeping the list ordered by creditor. Replaces a row with
/// the same id if one is already present.
pub(crate) fn insert_ordered(rows: &[Debt], debt: Debt) -> Vec<Debt> {
  let mut next: Vec<Debt> = rows.iter().filter(|d| d.id != debt.id).cloned().collect();
  let at = next.partition_point(|d| d.creditor <= debt.creditor);
  next.insert(at, debt);
  next
}

/// Replace the row with `debt.id`, unless the cached copy is newer.
///
/// Returns `None` when nothing changes: the row is gone (deleted meanwhile)
/// or the cached version was written after `debt`.
pub(crate) fn replace_if_newer(rows: &[Debt], debt: Debt) -> Option<Vec<Debt>> {
  let current = rows.iter().find(|d| d.id == debt.id)?;
  if current.updated_at > debt.updated_at {
    return None;
  }
  Some(insert_ordered(rows, debt))
}

/// Remove the row with `id`. Returns `None` if it is not cached.
pub(crate) fn remove(rows: &[Debt], id: &str) -> Option<Vec<Debt>> {
  if !rows.iter().any(|d| d.id == id) {
    return None;
  }
  Some(rows.iter().filter(|d| d.id != id).cloned().collect())
}
