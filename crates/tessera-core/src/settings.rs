//! Settings store consulted while a pipeline is assembled.
//!
//! Step registrations decide whether they are enabled by reading a
//! [`ReadOnlySettings`]. The store is passed into construction explicitly;
//! there is no process-wide settings instance.
//!
//! [`SettingsHolder`] keeps two layers, defaults and explicit overrides, with
//! case-insensitive keys. Once [`prevent_changes`](SettingsHolder::prevent_changes)
//! is called the holder is frozen.
//!
//! # Example
//!
//! ```
//! use tessera_core::settings::{ReadOnlySettings, SettingsHolder};
//!
//! let mut settings = SettingsHolder::new();
//! settings.set_default("Audit.Enabled", false).unwrap();
//! settings.set("audit.enabled", true).unwrap();
//!
//! let read: &dyn ReadOnlySettings = &settings;
//! assert!(read.get_or_default::<bool>("AUDIT.ENABLED"));
//! assert!(read.has_explicit_value("Audit.Enabled"));
//! ```

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the settings store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The holder has been locked by [`SettingsHolder::prevent_changes`].
    #[error("settings are locked; cannot change {key}")]
    Locked {
        /// The key that was being written.
        key: String,
    },

    /// No value or default exists for the key.
    #[error("no setting found for key: {key}")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// A value exists but has another type.
    #[error("setting {key} is not a {expected}")]
    TypeMismatch {
        /// The key that was looked up.
        key: String,
        /// The type the caller asked for.
        expected: &'static str,
    },
}

/// Read access to a settings store.
pub trait ReadOnlySettings: Send + Sync {
    /// Returns the effective value for `key`: the override if present,
    /// otherwise the default.
    fn lookup(&self, key: &str) -> Option<&(dyn Any + Send + Sync)>;

    /// Returns `true` if an explicit (non-default) value exists for `key`.
    fn has_explicit_value(&self, key: &str) -> bool;

    /// Returns `true` if either an explicit value or a default exists for `key`.
    fn has_setting(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }
}

impl dyn ReadOnlySettings + '_ {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NotFound`] or [`SettingsError::TypeMismatch`].
    pub fn get<T: Any>(&self, key: &str) -> Result<&T, SettingsError> {
        let value = self.lookup(key).ok_or_else(|| SettingsError::NotFound {
            key: key.to_string(),
        })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Returns the value stored under `key`, or `None` if it is absent or of
    /// another type.
    #[must_use]
    pub fn try_get<T: Any>(&self, key: &str) -> Option<&T> {
        self.lookup(key)?.downcast_ref::<T>()
    }

    /// Returns a copy of the value under `key`, or `T::default()`.
    #[must_use]
    pub fn get_or_default<T: Any + Clone + Default>(&self, key: &str) -> T {
        self.try_get::<T>(key).cloned().unwrap_or_default()
    }
}

type SettingValue = Arc<dyn Any + Send + Sync>;

/// Layered, lockable settings store.
#[derive(Default, Clone)]
pub struct SettingsHolder {
    defaults: HashMap<String, SettingValue>,
    overrides: HashMap<String, SettingValue>,
    locked: bool,
}

impl SettingsHolder {
    /// Creates an empty, unlocked holder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Locked`] once the holder is locked.
    pub fn set<T: Any + Send + Sync>(
        &mut self,
        key: impl AsRef<str>,
        value: T,
    ) -> Result<(), SettingsError> {
        let key = self.writable_key(key.as_ref())?;
        self.overrides.insert(key, Arc::new(value));
        Ok(())
    }

    /// Sets the default for `key`, used when no explicit value exists.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Locked`] once the holder is locked.
    pub fn set_default<T: Any + Send + Sync>(
        &mut self,
        key: impl AsRef<str>,
        value: T,
    ) -> Result<(), SettingsError> {
        let key = self.writable_key(key.as_ref())?;
        self.defaults.insert(key, Arc::new(value));
        Ok(())
    }

    /// Copies every default and explicit value of `other` into this holder.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Locked`] if this holder is locked.
    pub fn merge(&mut self, other: &SettingsHolder) -> Result<(), SettingsError> {
        if self.locked {
            return Err(SettingsError::Locked {
                key: "<merge>".to_string(),
            });
        }
        for (key, value) in &other.defaults {
            self.defaults.insert(key.clone(), Arc::clone(value));
        }
        for (key, value) in &other.overrides {
            self.overrides.insert(key.clone(), Arc::clone(value));
        }
        Ok(())
    }

    /// Freezes the holder. Later writes fail with [`SettingsError::Locked`].
    pub fn prevent_changes(&mut self) {
        self.locked = true;
    }

    /// Returns `true` once [`prevent_changes`](Self::prevent_changes) was called.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Removes every value and default and unlocks the holder.
    pub fn clear(&mut self) {
        self.defaults.clear();
        self.overrides.clear();
        self.locked = false;
    }

    /// Returns the number of distinct keys with a value or default.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defaults
            .keys()
            .chain(self.overrides.keys().filter(|k| !self.defaults.contains_key(*k)))
            .count()
    }

    /// Returns `true` if no key has a value or default.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.overrides.is_empty()
    }

    fn writable_key(&self, key: &str) -> Result<String, SettingsError> {
        if self.locked {
            return Err(SettingsError::Locked {
                key: key.to_string(),
            });
        }
        Ok(normalize(key))
    }
}

impl ReadOnlySettings for SettingsHolder {
    fn lookup(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        let key = normalize(key);
        self.overrides
            .get(&key)
            .or_else(|| self.defaults.get(&key))
            .map(|value| &**value)
    }

    fn has_explicit_value(&self, key: &str) -> bool {
        self.overrides.contains_key(&normalize(key))
    }
}

impl fmt::Debug for SettingsHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsHolder")
            .field("defaults", &self.defaults.len())
            .field("overrides", &self.overrides.len())
            .field("locked", &self.locked)
            .finish()
    }
}

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(holder: &SettingsHolder) -> &dyn ReadOnlySettings {
        holder
    }

    #[test]
    fn test_override_wins_over_default() {
        let mut holder = SettingsHolder::new();
        holder.set_default("Retries", 1_u32).unwrap();
        assert_eq!(read(&holder).get::<u32>("retries").unwrap(), &1);
        assert!(!holder.has_explicit_value("retries"));

        holder.set("RETRIES", 5_u32).unwrap();
        assert_eq!(read(&holder).get::<u32>("Retries").unwrap(), &5);
        assert!(holder.has_explicit_value("retries"));
        assert_eq!(holder.len(), 1);
    }

    #[test]
    fn test_missing_and_mismatch() {
        let mut holder = SettingsHolder::new();
        holder.set("name", String::from("orders")).unwrap();

        let settings = read(&holder);
        assert!(matches!(
            settings.get::<String>("missing"),
            Err(SettingsError::NotFound { .. })
        ));
        assert!(matches!(
            settings.get::<bool>("name"),
            Err(SettingsError::TypeMismatch { .. })
        ));
        assert!(settings.try_get::<bool>("name").is_none());
        assert!(!settings.get_or_default::<bool>("missing"));
        assert!(settings.has_setting("NAME"));
        assert!(!settings.has_setting("missing"));
    }

    #[test]
    fn test_locked_rejects_writes() {
        let mut holder = SettingsHolder::new();
        holder.set("a", 1_i64).unwrap();
        holder.prevent_changes();

        assert!(holder.is_locked());
        assert_eq!(
            holder.set("a", 2_i64),
            Err(SettingsError::Locked {
                key: "a".to_string()
            })
        );
        assert!(holder.set_default("b", 2_i64).is_err());
        assert!(holder.merge(&SettingsHolder::new()).is_err());
        assert_eq!(read(&holder).get::<i64>("a").unwrap(), &1);
    }

    #[test]
    fn test_merge_copies_both_layers() {
        let mut other = SettingsHolder::new();
        other.set_default("x", 1_i64).unwrap();
        other.set("y", 2_i64).unwrap();

        let mut holder = SettingsHolder::new();
        holder.set("x", 10_i64).unwrap();
        holder.merge(&other).unwrap();

        assert_eq!(read(&holder).get::<i64>("x").unwrap(), &10);
        assert!(holder.has_explicit_value("y"));
        assert_eq!(holder.len(), 2);
    }

    #[test]
    fn test_clear_unlocks() {
        let mut holder = SettingsHolder::new();
        holder.set("a", true).unwrap();
        holder.prevent_changes();
        holder.clear();

        assert!(holder.is_empty());
        assert!(holder.set("a", false).is_ok());
    }
}
