//! Required-field checks run before any write reaches the store.

use super::types::{DebtPatch, NewDebt};
use crate::error::{Error, Result};

pub trait Validator: Send + Sync {
  fn validate_new(&self, debt: &NewDebt) -> Result<()>;
  fn validate_patch(&self, patch: &DebtPatch) -> Result<()>;
}

/// Creditor must be non-blank and amount finite and positive.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFields;

fn check_creditor(creditor: &str) -> Result<()> {
  if creditor.trim().is_empty() {
    return Err(Error::validation("creditor", "Creditor is required"));
  }
  Ok(())
}

fn check_amount(amount: f64) -> Result<()> {
  if !amount.is_finite() || amount <= 0.0 {
    return Err(Error::validation("amount", "Amount must be greater than 0"));
  }
  Ok(())
}

impl Validator for RequiredFields {
  fn validate_new(&self, debt: &NewDebt) -> Result<()> {
    check_creditor(&debt.creditor)?;
    check_amount(debt.amount)
  }

  fn validate_patch(&self, patch: &DebtPatch) -> Result<()> {
    if patch.is_empty() {
      return Err(Error::validation("patch", "Nothing to update"));
    }
    if let Some(creditor) = &patch.creditor {
      check_creditor(creditor)?;
    }
    if let Some(amount) = patch.amount {
      check_amount(amount)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::debts::types::Priority;

  #[test]
  fn test_rejects_blank_creditor_and_bad_amounts() {
    let v = RequiredFields;
    assert!(v.validate_new(&NewDebt::new("Bank", 0.01, Priority::Low)).is_ok());
    assert!(matches!(
      v.validate_new(&NewDebt::new("   ", 10.0, Priority::Low)),
      Err(Error::Validation { field: "creditor", .. })
    ));
    for amount in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      assert!(matches!(
        v.validate_new(&NewDebt::new("Bank", amount, Priority::Low)),
        Err(Error::Validation { field: "amount", .. })
      ));
    }
  }

  #[test]
  fn test_patch_checks_only_set_fields() {
    let v = RequiredFields;
    assert!(v.validate_patch(&DebtPatch::default()).is_err());
    let patch = DebtPatch {
      amount: Some(-3.0),
      ..DebtPatch::default()
    };
    assert!(v.validate_patch(&patch).is_err());
    let patch = DebtPatch {
      creditor: Some("New name".into()),
      ..DebtPatch::default()
    };
    assert!(v.validate_patch(&patch).is_ok());
  }
}
