//! Current-user identity and session lifecycle.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub id: String,
  pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
  pub user: Option<User>,
  /// The session has not been resolved yet
  pub loading: bool,
}

/// Source of the signed-in user. Token handling stays behind this trait.
pub trait AuthProvider: Send + Sync {
  fn state(&self) -> AuthState;

  /// Receiver that observes every session change.
  fn watch(&self) -> watch::Receiver<AuthState>;

  fn current_user(&self) -> Option<User> {
    self.state().user
  }
}

/// In-process session holder.
pub struct SessionAuth {
  tx: watch::Sender<AuthState>,
}

impl SessionAuth {
  /// Session still being resolved.
  pub fn loading() -> Self {
    Self {
      tx: watch::Sender::new(AuthState {
        user: None,
        loading: true,
      }),
    }
  }

  pub fn signed_in(user: User) -> Self {
    Self {
      tx: watch::Sender::new(AuthState {
        user: Some(user),
        loading: false,
      }),
    }
  }

  pub fn signed_out() -> Self {
    Self {
      tx: watch::Sender::new(AuthState::default()),
    }
  }

  pub fn sign_in(&self, user: User) {
    self.tx.send_replace(AuthState {
      user: Some(user),
      loading: false,
    });
  }

  pub fn sign_out(&self) {
    self.tx.send_replace(AuthState::default());
  }
}

impl AuthProvider for SessionAuth {
  fn state(&self) -> AuthState {
    self.tx.borrow().clone()
  }

  fn watch(&self) -> watch::Receiver<AuthState> {
    self.tx.subscribe()
  }
}
