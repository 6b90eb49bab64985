//! Browser storage behind the core [`KeyValueStore`] trait.

use alverse_core::{KeyValueStore, StorageError};
use web_sys::Storage;

use crate::dom;

/// `localStorage` or `sessionStorage`. An unavailable store fails every call
/// with [`StorageError::Unavailable`] instead of failing construction, so a
/// private-mode browser still gets a working bridge.
#[derive(Clone, Debug)]
pub struct WebStorage {
    inner: Option<Storage>,
}

fn op_error(err: &wasm_bindgen::JsValue) -> StorageError {
    StorageError::Operation(dom::js_error_message(err))
}

impl WebStorage {
    #[must_use]
    pub fn local() -> Self {
        Self::from_result(dom::local_storage())
    }

    /// Tab-scoped store used for the active play session.
    #[must_use]
    pub fn session() -> Self {
        Self::from_result(dom::session_storage())
    }

    fn from_result(storage: Result<Storage, wasm_bindgen::JsValue>) -> Self {
        match storage {
            Ok(storage) => Self {
                inner: Some(storage),
            },
            Err(err) => {
                log::warn!("Browser storage unavailable: {}", dom::js_error_message(&err));
                Self { inner: None }
            }
        }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    fn storage(&self) -> Result<&Storage, StorageError> {
        self.inner.as_ref().ok_or(StorageError::Unavailable)
    }
}

impl KeyValueStore for WebStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage()?.get_item(key).map_err(|e| op_error(&e))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage()?.set_item(key, value).map_err(|e| op_error(&e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage()?.remove_item(key).map_err(|e| op_error(&e))
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.storage()?.clear().map_err(|e| op_error(&e))
    }
}
