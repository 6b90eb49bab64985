//! Local key/value persistence.
//!
//! The browser keeps two stores: a durable one for the cached identity, the
//! completion flags and the replay flag, and a tab-scoped one for the active
//! play session. Both are plain string maps behind [`KeyValueStore`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_USERNAME, KEY_REPLAY_MODE, KEY_USER_EMAIL, KEY_USER_ID, KEY_USERNAME,
    level_completed_key,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable")]
    Unavailable,
    #[error("Storage operation failed: {0}")]
    Operation(String),
}

/// Minimal string map used for browser-local persistence.
pub trait KeyValueStore {
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns an error if the key cannot be removed.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

/// Identity cached locally after sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedIdentity {
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

impl CachedIdentity {
    /// Read the cached identity. Unreadable keys read as absent.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        let read = |key: &str| store.get(key).ok().flatten().filter(|v| !v.is_empty());
        Self {
            email: read(KEY_USER_EMAIL),
            user_id: read(KEY_USER_ID),
            username: read(KEY_USERNAME),
        }
    }

    /// Write every present field. Absent fields leave the stored value alone.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<(), StorageError> {
        let fields = [
            (KEY_USER_EMAIL, &self.email),
            (KEY_USER_ID, &self.user_id),
            (KEY_USERNAME, &self.username),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                store.set(key, value)?;
            }
        }
        Ok(())
    }

    /// Username for display, falling back to the placeholder.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(DEFAULT_USERNAME)
    }
}

/// # Errors
///
/// Returns an error if the flag cannot be written.
pub fn mark_level_completed<S: KeyValueStore + ?Sized>(
    store: &S,
    level_number: u32,
) -> Result<(), StorageError> {
    store.set(&level_completed_key(level_number), "true")
}

#[must_use]
pub fn level_marked_completed<S: KeyValueStore + ?Sized>(store: &S, level_number: u32) -> bool {
    matches!(
        store.get(&level_completed_key(level_number)),
        Ok(Some(value)) if value == "true"
    )
}

#[must_use]
pub fn replay_mode<S: KeyValueStore + ?Sized>(store: &S) -> bool {
    matches!(store.get(KEY_REPLAY_MODE), Ok(Some(value)) if value == "true")
}

/// # Errors
///
/// Returns an error if the flag cannot be written.
pub fn set_replay_mode<S: KeyValueStore + ?Sized>(store: &S) -> Result<(), StorageError> {
    store.set(KEY_REPLAY_MODE, "true")
}

/// # Errors
///
/// Returns an error if the flag cannot be removed.
pub fn clear_replay_mode<S: KeyValueStore + ?Sized>(store: &S) -> Result<(), StorageError> {
    store.remove(KEY_REPLAY_MODE)
}
