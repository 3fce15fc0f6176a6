//! In-process remote store.
//!
//! Data is lost on process exit. Use for tests and demos.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{sort_rows, Clock, RemoteStore, SelectQuery};
use crate::debts::{Debt, DebtInsert, DebtPatch};
use crate::error::Result;

struct State {
  rows: Vec<Debt>,
  next_id: u64,
  clock: Clock,
}

pub struct MemoryStore {
  state: Mutex<State>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(State {
        rows: Vec::new(),
        next_id: 1,
        clock: Clock::default(),
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Number of rows across all owners.
  pub fn len(&self) -> usize {
    self.lock().rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().rows.is_empty()
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl RemoteStore for MemoryStore {
  async fn select(&self, query: &SelectQuery) -> Result<Vec<Debt>> {
    let mut rows: Vec<Debt> = self
      .lock()
      .rows
      .iter()
      .filter(|d| d.user_id == query.owner_id)
      .cloned()
      .collect();
    sort_rows(&mut rows, query);
    Ok(rows)
  }

  async fn insert(&self, row: &DebtInsert) -> Result<Debt> {
    let mut state = self.lock();
    let id = format!("debt-{:06}", state.next_id);
    state.next_id += 1;
    let now = state.clock.stamp(None);
    let debt = Debt {
      id,
      user_id: row.user_id.clone(),
      creditor: row.creditor.clone(),
      amount: row.amount,
      description: row.description.clone(),
      due_date: row.due_date,
      status: row.status,
      priority: row.priority,
      created_at: now,
      updated_at: now,
    };
    state.rows.push(debt.clone());
    Ok(debt)
  }

  async fn update(&self, id: &str, owner_id: &str, patch: &DebtPatch) -> Result<Option<Debt>> {
    let mut state = self.lock();
    let Some(at) = state
      .rows
      .iter()
      .position(|d| d.id == id && d.user_id == owner_id)
    else {
      return Ok(None);
    };
    let previous = state.rows[at].updated_at;
    let now = state.clock.stamp(Some(previous));
    let mut next = patch.apply_to(&state.rows[at]);
    next.updated_at = now;
    state.rows[at] = next.clone();
    Ok(Some(next))
  }

  async fn delete(&self, id: &str, owner_id: &str) -> Result<u64> {
    let mut state = self.lock();
    let before = state.rows.len();
    state.rows.retain(|d| !(d.id == id && d.user_id == owner_id));
    Ok((before - state.rows.len()) as u64)
  }
}
