//! Error taxonomy shared by the cache, the remote stores and the mutation layer.

use thiserror::Error;

/// Errors produced by reads, writes and local collaborators.
///
/// Errors are `Clone` so one failed fetch can be handed to every caller that
/// joined it and stored on the cache entry at the same time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
  /// Transport or timeout failure talking to the remote store.
  #[error("network error: {0}")]
  Network(String),

  /// Input rejected before any network call.
  #[error("invalid {field}: {message}")]
  Validation {
    field: &'static str,
    message: String,
  },

  /// The record does not exist within the caller's ownership scope.
  #[error("debt {id} not found")]
  NotFound { id: String },

  /// A mutation was attempted with no signed-in user.
  #[error("not signed in")]
  Unauthenticated,

  /// The remote store answered but refused the request.
  #[error("remote store rejected the request ({status}): {message}")]
  Rejected { status: u16, message: String },

  /// Local backend failure (SQLite, preference file).
  #[error("storage error: {0}")]
  Storage(String),
}

/// Result type alias for cache and store operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
    Self::Validation {
      field,
      message: message.into(),
    }
  }

  /// Returns true if a read may be retried after this error.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Network(_))
  }

  /// Short text suitable for showing to the person using the app.
  pub fn user_message(&self) -> String {
    match self {
      Self::Rejected { message, .. } if message.contains("JWT expired") => {
        "Your session has expired. Please sign in again.".to_string()
      }
      Self::Network(_) => {
        "Network error. Please check your internet connection and try again.".to_string()
      }
      Self::NotFound { .. } => "That debt no longer exists.".to_string(),
      Self::Unauthenticated => "Please sign in first.".to_string(),
      Self::Validation { message, .. } => message.clone(),
      Self::Rejected { message, .. } => message.clone(),
      Self::Storage(_) => "An unexpected error occurred".to_string(),
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Self::Storage(e.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    match e.status() {
      Some(status) => Self::Rejected {
        status: status.as_u16(),
        message: e.to_string(),
      },
      None if e.is_decode() => Self::Rejected {
        status: 0,
        message: format!("malformed response: {}", e),
      },
      None => Self::Network(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_only_network_errors_retry() {
    assert!(Error::Network("reset".into()).is_retryable());
    assert!(!Error::NotFound { id: "a".into() }.is_retryable());
    assert!(!Error::Unauthenticated.is_retryable());
    assert!(!Error::validation("amount", "must be positive").is_retryable());
  }

  #[test]
  fn test_expired_session_message() {
    let err = Error::Rejected {
      status: 401,
      message: "JWT expired".into(),
    };
    assert_eq!(
      err.user_message(),
      "Your session has expired. Please sign in again."
    );
  }
}
