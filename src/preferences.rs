//! Display preferences persisted through a key-value store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

use crate::error::{Error, Result};

/// Key the preferences are stored under.
pub const PREFERENCES_KEY: &str = "user_preferences";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
  #[default]
  Inr,
  Usd,
}

impl Currency {
  pub fn symbol(&self) -> &'static str {
    match self {
      Self::Inr => "₹",
      Self::Usd => "$",
    }
  }

  /// `amount` with the currency symbol and two decimals.
  pub fn format(&self, amount: f64) -> String {
    format!("{}{:.2}", self.symbol(), amount)
  }
}

impl fmt::Display for Currency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Inr => "INR",
      Self::Usd => "USD",
    })
  }
}

impl FromStr for Currency {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "INR" => Ok(Self::Inr),
      "USD" => Ok(Self::Usd),
      other => Err(format!("Unsupported currency {}", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
  #[serde(rename = "currencyPreference", default)]
  pub currency: Currency,
  #[serde(default = "default_true")]
  pub notifications_enabled: bool,
}

fn default_true() -> bool {
  true
}

impl Default for Preferences {
  fn default() -> Self {
    Self {
      currency: Currency::default(),
      notifications_enabled: true,
    }
  }
}

/// String key-value persistence.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;
  fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Key-value pairs kept in one JSON file.
pub struct FileKeyValueStore {
  path: PathBuf,
}

impl FileKeyValueStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Store at the default location in the data directory.
  pub fn open_default() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Storage("Could not determine data directory".to_string()))?;
    Ok(Self::new(data_dir.join("debts").join("settings.json")))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn read_all(&self) -> Result<BTreeMap<String, String>> {
    match std::fs::read_to_string(&self.path) {
      Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
        Error::Storage(format!(
          "Failed to parse {}: {}",
          self.path.display(),
          e
        ))
      }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
      Err(e) => Err(Error::Storage(format!(
        "Failed to read {}: {}",
        self.path.display(),
        e
      ))),
    }
  }
}

impl KeyValueStore for FileKeyValueStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.read_all()?.remove(key))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut all = self.read_all()?;
    all.insert(key.to_string(), value.to_string());

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("Failed to create settings directory: {}", e)))?;
    }
    let contents = serde_json::to_string_pretty(&all)
      .map_err(|e| Error::Storage(format!("Failed to serialize settings: {}", e)))?;
    std::fs::write(&self.path, contents)
      .map_err(|e| Error::Storage(format!("Failed to write {}: {}", self.path.display(), e)))
  }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
  values: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore for MemoryKeyValueStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

/// Typed access to the stored preferences.
pub struct PreferenceStore<S> {
  store: S,
}

impl<S: KeyValueStore> PreferenceStore<S> {
  pub fn new(store: S) -> Self {
    Self { store }
  }

  /// Stored preferences, or the defaults if they are missing or unreadable.
  pub fn load(&self) -> Preferences {
    let raw = match self.store.get(PREFERENCES_KEY) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Preferences::default(),
      Err(e) => {
        warn!("Error loading preferences: {}", e);
        return Preferences::default();
      }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
      warn!("Error loading preferences: {}", e);
      Preferences::default()
    })
  }

  pub fn save(&self, preferences: &Preferences) -> Result<()> {
    let raw = serde_json::to_string(preferences)
      .map_err(|e| Error::Storage(format!("Failed to serialize preferences: {}", e)))?;
    self.store.set(PREFERENCES_KEY, &raw)
  }

  /// Load, modify and save in one step; returns the saved value.
  pub fn update(&self, f: impl FnOnce(&mut Preferences)) -> Result<Preferences> {
    let mut preferences = self.load();
    f(&mut preferences);
    self.save(&preferences)?;
    Ok(preferences)
  }
}
