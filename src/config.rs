use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::User;
use crate::cache::{CacheOptions, RetryPolicy};
use crate::debts::DebtsOptions;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub backend: Backend,
  pub postgrest: Option<PostgrestConfig>,
  #[serde(default)]
  pub sqlite: SqliteConfig,
  /// Signed-in user; without it every command runs signed out
  pub user: Option<UserConfig>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// Supabase / PostgREST over HTTP
  Postgrest,
  /// Local SQLite file
  #[default]
  Sqlite,
  /// In-process only, nothing persists
  Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgrestConfig {
  /// Project URL, e.g. https://project.supabase.co
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqliteConfig {
  /// Database file (defaults to the data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
  pub id: String,
  #[serde(default)]
  pub email: String,
}

impl From<UserConfig> for User {
  fn from(user: UserConfig) -> Self {
    User {
      id: user.id,
      email: user.email,
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_stale_time_secs")]
  pub stale_time_secs: u64,
  #[serde(default = "default_retries")]
  pub retries: u32,
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
  /// Apply updates and deletes locally before the store confirms them
  #[serde(default)]
  pub optimistic: bool,
}

fn default_stale_time_secs() -> u64 {
  30
}

fn default_retries() -> u32 {
  2
}

fn default_retry_delay_ms() -> u64 {
  250
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: default_stale_time_secs(),
      retries: default_retries(),
      retry_delay_ms: default_retry_delay_ms(),
      optimistic: false,
    }
  }
}

impl CacheConfig {
  pub fn options(&self) -> DebtsOptions {
    DebtsOptions {
      cache: CacheOptions {
        stale_time: Duration::from_secs(self.stale_time_secs),
        retry: RetryPolicy {
          retries: self.retries,
          base_delay: Duration::from_millis(self.retry_delay_ms),
          ..RetryPolicy::default()
        },
      },
      optimistic: self.optimistic,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./debts.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/debts/config.yaml
  ///
  /// Without any file the defaults apply (local SQLite, signed out).
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("debts.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("debts").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  pub fn postgrest(&self) -> Result<&PostgrestConfig> {
    self
      .postgrest
      .as_ref()
      .ok_or_else(|| eyre!("The postgrest backend needs a `postgrest.url` in the config file"))
  }

  /// Get the API key from environment variables.
  ///
  /// Checks DEBTS_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("DEBTS_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set DEBTS_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Get the user's session token from DEBTS_ACCESS_TOKEN, if set.
  pub fn get_access_token() -> Option<String> {
    std::env::var("DEBTS_ACCESS_TOKEN").ok()
  }
}
