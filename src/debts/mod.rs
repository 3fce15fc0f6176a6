//! Debt records: types, validation, cache wiring and the coordinated
//! read/write service.

mod cache;
mod mutations;
mod service;
mod types;
mod validate;

pub use cache::DebtQueryKey;
pub use mutations::DebtMutations;
pub use service::{Debts, DebtsOptions, SelectDebts};
pub use types::{Debt, DebtInsert, DebtPatch, DebtStatus, DebtTotals, NewDebt, Priority};
pub use validate::{RequiredFields, Validator};
