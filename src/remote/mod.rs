//! Remote store clients: the system of record for debt rows.
//!
//! Every write is scoped by owner id; reads filter by owner id explicitly.
//! A write that matches no row in the caller's scope reports zero rows, which
//! callers treat as "not found".

mod memory;
mod postgrest;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::debts::{Debt, DebtInsert, DebtPatch};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;
pub use sqlite::SqliteStore;

/// Table holding debt rows.
pub const DEBTS_TABLE: &str = "debts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
  #[default]
  Creditor,
  CreatedAt,
  Amount,
}

impl OrderBy {
  pub fn column(&self) -> &'static str {
    match self {
      Self::Creditor => "creditor",
      Self::CreatedAt => "created_at",
      Self::Amount => "amount",
    }
  }
}

/// Owner-filtered select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
  pub owner_id: String,
  pub order_by: OrderBy,
  pub ascending: bool,
}

impl SelectQuery {
  /// All rows of `owner_id` by creditor, A to Z.
  pub fn owned_by(owner_id: impl Into<String>) -> Self {
    Self {
      owner_id: owner_id.into(),
      order_by: OrderBy::Creditor,
      ascending: true,
    }
  }
}

/// Row-oriented CRUD backend for debts.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  async fn select(&self, query: &SelectQuery) -> Result<Vec<Debt>>;

  /// Insert a row; the store assigns id and timestamps.
  async fn insert(&self, row: &DebtInsert) -> Result<Debt>;

  /// Apply `patch` to row `id` owned by `owner_id`.
  /// Returns `None` when no row matched.
  async fn update(&self, id: &str, owner_id: &str, patch: &DebtPatch) -> Result<Option<Debt>>;

  /// Delete row `id` owned by `owner_id`, returning the number of rows removed.
  async fn delete(&self, id: &str, owner_id: &str) -> Result<u64>;
}

/// Sort rows in memory the way a select with `query` orders them.
pub(crate) fn sort_rows(rows: &mut [Debt], query: &SelectQuery) {
  rows.sort_by(|a, b| {
    let ord = match query.order_by {
      OrderBy::Creditor => a.creditor.cmp(&b.creditor),
      OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
      OrderBy::Amount => a.amount.total_cmp(&b.amount),
    };
    if query.ascending {
      ord
    } else {
      ord.reverse()
    }
  });
}

/// Source of strictly increasing row timestamps.
///
/// Every stamp is later than the previous one and later than `after`, even
/// when the wall clock stalls or steps backwards.
#[derive(Debug, Default)]
pub(crate) struct Clock {
  last: Option<DateTime<Utc>>,
}

impl Clock {
  pub(crate) fn stamp(&mut self, after: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let floor = self.last.max(after);
    let now = Utc::now();
    let stamp = match floor {
      Some(floor) if now <= floor => floor + Duration::microseconds(1),
      _ => now,
    };
    self.last = Some(stamp);
    stamp
  }
}
