use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DebtStatus {
  #[default]
  Pending,
  Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
  Low,
  Medium,
  High,
}

impl DebtStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Paid => "PAID",
    }
  }
}

impl Priority {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Low => "LOW",
      Self::Medium => "MEDIUM",
      Self::High => "HIGH",
    }
  }
}

impl fmt::Display for DebtStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DebtStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "PENDING" => Ok(Self::Pending),
      "PAID" => Ok(Self::Paid),
      other => Err(format!("Status must be PENDING or PAID, got {}", other)),
    }
  }
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "LOW" => Ok(Self::Low),
      "MEDIUM" => Ok(Self::Medium),
      "HIGH" => Ok(Self::High),
      other => Err(format!("Priority must be LOW, MEDIUM, or HIGH, got {}", other)),
    }
  }
}

/// A debt row as stored by the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
  pub id: String,
  pub user_id: String,
  pub creditor: String,
  pub amount: f64,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub due_date: Option<NaiveDate>,
  pub status: DebtStatus,
  pub priority: Priority,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Fields a user supplies when recording a debt
#[derive(Debug, Clone, PartialEq)]
pub struct NewDebt {
  pub creditor: String,
  pub amount: f64,
  pub priority: Priority,
  pub description: Option<String>,
  pub due_date: Option<NaiveDate>,
}

impl NewDebt {
  pub fn new(creditor: impl Into<String>, amount: f64, priority: Priority) -> Self {
    Self {
      creditor: creditor.into(),
      amount,
      priority,
      description: None,
      due_date: None,
    }
  }

  /// Row to insert on behalf of `user_id`. New debts always start out pending.
  pub fn into_insert(self, user_id: &str) -> DebtInsert {
    DebtInsert {
      user_id: user_id.to_string(),
      creditor: self.creditor.trim().to_string(),
      amount: self.amount,
      description: self.description,
      due_date: self.due_date,
      status: DebtStatus::Pending,
      priority: self.priority,
    }
  }
}

/// Insert payload; id and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtInsert {
  pub user_id: String,
  pub creditor: String,
  pub amount: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<NaiveDate>,
  pub status: DebtStatus,
  pub priority: Priority,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebtPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub creditor: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub amount: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<DebtStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<NaiveDate>,
}

impl DebtPatch {
  pub fn status(status: DebtStatus) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  /// The patch as it should be sent to a store: creditor trimmed.
  pub fn normalized(mut self) -> Self {
    if let Some(creditor) = self.creditor.as_mut() {
      *creditor = creditor.trim().to_string();
    }
    self
  }

  /// Local preview of the patched row. The store's answer replaces it.
  pub fn apply_to(&self, debt: &Debt) -> Debt {
    let mut next = debt.clone();
    if let Some(creditor) = &self.creditor {
      next.creditor = creditor.trim().to_string();
    }
    if let Some(amount) = self.amount {
      next.amount = amount;
    }
    if let Some(status) = self.status {
      next.status = status;
    }
    if let Some(priority) = self.priority {
      next.priority = priority;
    }
    if let Some(description) = &self.description {
      next.description = Some(description.clone());
    }
    if let Some(due_date) = self.due_date {
      next.due_date = Some(due_date);
    }
    next
  }
}

/// Aggregates shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DebtTotals {
  pub count: usize,
  pub total: f64,
  pub pending_count: usize,
  pub pending: f64,
  pub paid_count: usize,
  pub paid: f64,
}

impl DebtTotals {
  pub fn from_debts(debts: &[Debt]) -> Self {
    debts.iter().fold(Self::default(), |mut totals, debt| {
      totals.count += 1;
      totals.total += debt.amount;
      match debt.status {
        DebtStatus::Pending => {
          totals.pending_count += 1;
          totals.pending += debt.amount;
        }
        DebtStatus::Paid => {
          totals.paid_count += 1;
          totals.paid += debt.amount;
        }
      }
      totals
    })
  }
}
