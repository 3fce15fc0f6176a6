//! Owner-scoped debt records with a cached query layer.
//!
//! [`debts::Debts`] is the entry point: it reads the signed-in user's list
//! through a [`cache::QueryClient`] (stale-while-revalidate, one fetch in
//! flight per key) and writes through [`debts::DebtMutations`], which keeps
//! the cached list consistent with the [`remote::RemoteStore`].

pub mod auth;
pub mod cache;
pub mod config;
pub mod debts;
pub mod error;
pub mod logging;
pub mod preferences;
pub mod query;
pub mod remote;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
