//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::Error;

/// Trait for entities that can be held in a cache entry.
///
/// Implementors provide a unique key and, when the backend tracks it, the
/// server-assigned modification time used to reject out-of-order writes.
pub trait Cacheable: Clone + Debug + Send + Sync + 'static {
  /// Unique identifier for this entity (e.g. a debt id)
  fn cache_key(&self) -> &str;

  /// Last modification timestamp assigned by the server.
  /// Returns None if the entity doesn't track modification time.
  fn updated_at(&self) -> Option<DateTime<Utc>>;

  /// Entity type name, used in log output
  fn entity_type() -> &'static str;
}

/// Typed key addressing one cache entry (entity type plus scoping parameters).
pub trait QueryKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {
  /// Human-readable description for logs.
  fn description(&self) -> String;
}

/// Overall state of an entry's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Query is disabled (for example nobody is signed in)
  Idle,
  /// No data has arrived yet
  Pending,
  /// Data is available and the last fetch succeeded
  Success,
  /// The last fetch failed; previously cached data may still be present
  Error,
}

/// Point-in-time view of a cache entry handed to consumers.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
  pub data: Option<Arc<Vec<T>>>,
  pub status: QueryStatus,
  pub error: Option<Error>,
  /// A network fetch for this entry is in flight
  pub is_fetching: bool,
  /// When the data was last written, by a fetch or locally
  pub updated_at: Option<Instant>,
}

impl<T> QuerySnapshot<T> {
  /// Snapshot for a query that must not run.
  pub fn disabled() -> Self {
    Self {
      data: None,
      status: QueryStatus::Idle,
      error: None,
      is_fetching: false,
      updated_at: None,
    }
  }

  /// True while the first fetch is running and nothing is cached yet.
  pub fn is_loading(&self) -> bool {
    self.data.is_none() && self.is_fetching
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_idle(&self) -> bool {
    self.status == QueryStatus::Idle
  }

  /// Cached rows, or an empty slice when nothing is cached.
  pub fn rows(&self) -> &[T] {
    self.data.as_deref().map(Vec::as_slice).unwrap_or(&[])
  }
}
