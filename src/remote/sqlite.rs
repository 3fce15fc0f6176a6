//! Local single-file store backed by SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Clock, RemoteStore, SelectQuery};
use crate::debts::{Debt, DebtInsert, DebtPatch, DebtStatus, Priority};
use crate::error::{Error, Result};

/// Schema for the debts table.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS debts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    creditor TEXT NOT NULL,
    amount REAL NOT NULL CHECK (amount > 0),
    description TEXT,
    due_date TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING' CHECK (status IN ('PENDING', 'PAID')),
    priority TEXT NOT NULL CHECK (priority IN ('LOW', 'MEDIUM', 'HIGH')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_debts_user ON debts(user_id, creditor);
"#;

const COLUMNS: &str =
  "id, user_id, creditor, amount, description, due_date, status, priority, created_at, updated_at";

struct Db {
  conn: Connection,
  clock: Clock,
}

pub struct SqliteStore {
  db: Mutex<Db>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::Storage(format!(
        "Failed to open database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| Error::Storage(format!("Failed to run migrations: {}", e)))?;
    Ok(Self {
      db: Mutex::new(Db {
        conn,
        clock: Clock::default(),
      }),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Storage("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("debts").join("debts.db"))
  }

  fn with_db<T>(&self, f: impl FnOnce(&mut Db) -> Result<T>) -> Result<T> {
    let mut db = self
      .db
      .lock()
      .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))?;
    f(&mut db)
  }
}

impl ToSql for DebtStatus {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.as_str()))
  }
}

impl FromSql for DebtStatus {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    value
      .as_str()?
      .parse()
      .map_err(|e: String| FromSqlError::Other(e.into()))
  }
}

impl ToSql for Priority {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.as_str()))
  }
}

impl FromSql for Priority {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    value
      .as_str()?
      .parse()
      .map_err(|e: String| FromSqlError::Other(e.into()))
  }
}

fn debt_from_row(row: &Row<'_>) -> rusqlite::Result<Debt> {
  Ok(Debt {
    id: row.get(0)?,
    user_id: row.get(1)?,
    creditor: row.get(2)?,
    amount: row.get(3)?,
    description: row.get(4)?,
    due_date: row.get(5)?,
    status: row.get(6)?,
    priority: row.get(7)?,
    created_at: row.get(8)?,
    updated_at: row.get(9)?,
  })
}

#[async_trait]
impl RemoteStore for SqliteStore {
  async fn select(&self, query: &SelectQuery) -> Result<Vec<Debt>> {
    self.with_db(|db| {
      let direction = if query.ascending { "ASC" } else { "DESC" };
      let sql = format!(
        "SELECT {} FROM debts WHERE user_id = ? ORDER BY {} {}",
        COLUMNS,
        query.order_by.column(),
        direction
      );
      let mut stmt = db.conn.prepare(&sql)?;
      let rows = stmt
        .query_map(params![query.owner_id], debt_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
  }

  async fn insert(&self, row: &DebtInsert) -> Result<Debt> {
    self.with_db(|db| {
      let now = db.clock.stamp(None);
      let sql = format!(
        "INSERT INTO debts ({})
         VALUES (lower(hex(randomblob(16))), ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {}",
        COLUMNS, COLUMNS
      );
      let debt = db.conn.query_row(
        &sql,
        params![
          row.user_id,
          row.creditor,
          row.amount,
          row.description,
          row.due_date,
          row.status,
          row.priority,
          now,
          now
        ],
        debt_from_row,
      )?;
      Ok(debt)
    })
  }

  async fn update(&self, id: &str, owner_id: &str, patch: &DebtPatch) -> Result<Option<Debt>> {
    self.with_db(|db| {
      let current: Option<DateTime<Utc>> = db
        .conn
        .query_row(
          "SELECT updated_at FROM debts WHERE id = ? AND user_id = ?",
          params![id, owner_id],
          |row| row.get(0),
        )
        .optional()?;
      let Some(current) = current else {
        return Ok(None);
      };
      let now = db.clock.stamp(Some(current));

      let sql = format!(
        "UPDATE debts SET
           creditor = COALESCE(?1, creditor),
           amount = COALESCE(?2, amount),
           status = COALESCE(?3, status),
           priority = COALESCE(?4, priority),
           description = COALESCE(?5, description),
           due_date = COALESCE(?6, due_date),
           updated_at = ?7
         WHERE id = ?8 AND user_id = ?9
         RETURNING {}",
        COLUMNS
      );
      let mut stmt = db.conn.prepare(&sql)?;
      let mut rows = stmt.query_map(
        params![
          patch.creditor.as_deref().map(str::trim),
          patch.amount,
          patch.status,
          patch.priority,
          patch.description,
          patch.due_date,
          now,
          id,
          owner_id
        ],
        debt_from_row,
      )?;
      let debt = rows.next().transpose()?;
      Ok(debt)
    })
  }

  async fn delete(&self, id: &str, owner_id: &str) -> Result<u64> {
    self.with_db(|db| {
      let removed = db.conn.execute(
        "DELETE FROM debts WHERE id = ? AND user_id = ?",
        params![id, owner_id],
      )?;
      Ok(removed as u64)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::debts::NewDebt;

  async fn seeded() -> (SqliteStore, Debt) {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut new = NewDebt::new("Bank A", 100.0, Priority::High);
    new.description = Some("car loan".to_string());
    let debt = store.insert(&new.into_insert("u1")).await.unwrap();
    (store, debt)
  }

  #[tokio::test]
  async fn test_insert_returns_server_row() {
    let (store, debt) = seeded().await;
    assert_eq!(debt.id.len(), 32);
    assert_eq!(debt.status, DebtStatus::Pending);
    assert_eq!(debt.description.as_deref(), Some("car loan"));

    let rows = store.select(&SelectQuery::owned_by("u1")).await.unwrap();
    assert_eq!(rows, vec![debt]);
  }

  #[tokio::test]
  async fn test_partial_update_keeps_other_fields() {
    let (store, debt) = seeded().await;
    let patch = DebtPatch {
      amount: Some(80.0),
      ..DebtPatch::default()
    };
    let updated = store.update(&debt.id, "u1", &patch).await.unwrap().unwrap();
    assert_eq!(updated.amount, 80.0);
    assert_eq!(updated.creditor, "Bank A");
    assert_eq!(updated.priority, Priority::High);
    assert_eq!(updated.description.as_deref(), Some("car loan"));
    assert!(updated.updated_at >= debt.updated_at);
  }

  #[tokio::test]
  async fn test_foreign_owner_matches_nothing() {
    let (store, debt) = seeded().await;
    let patch = DebtPatch::status(DebtStatus::Paid);
    assert_eq!(store.update(&debt.id, "u2", &patch).await.unwrap(), None);
    assert_eq!(store.delete(&debt.id, "u2").await.unwrap(), 0);
    assert_eq!(store.delete(&debt.id, "u1").await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_amount_check_constraint() {
    let store = SqliteStore::open_in_memory().unwrap();
    let err = store
      .insert(&NewDebt::new("Bank A", -5.0, Priority::Low).into_insert("u1"))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
  }

  #[tokio::test]
  async fn test_update_stamps_after_current_row() {
    let (store, debt) = seeded().await;
    let future = Utc::now() + chrono::Duration::hours(1);
    store
      .with_db(|db| {
        db.conn.execute(
          "UPDATE debts SET updated_at = ? WHERE id = ?",
          params![future, debt.id],
        )?;
        Ok(())
      })
      .unwrap();

    let updated = store
      .update(&debt.id, "u1", &DebtPatch::status(DebtStatus::Paid))
      .await
      .unwrap()
      .unwrap();
    assert!(updated.updated_at > future);
  }
}
