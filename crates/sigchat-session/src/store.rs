//! String-keyed byte storage.
//!
//! [`KeyValueStore`] is the narrow capability the installer and the
//! protocol store are written against. Typed access goes through
//! [`KeyValueStoreExt`], which encodes values with bincode.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed helpers on top of any [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Codec {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.put(key, bytes)
    }

    /// Like [`load`](Self::load), but a missing value is an error.
    fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        self.load(key)?
            .ok_or_else(|| StoreError::MissingKey(key.to_string()))
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// Process-local store, lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    Ok(())
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        check_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        check_key(key)?;
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.put("a", vec![1, 2, 3]).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.len(), 1);

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = InMemoryStore::new();
        assert_eq!(store.get(""), Err(StoreError::EmptyKey));
        assert_eq!(store.put("", vec![]), Err(StoreError::EmptyKey));
        assert_eq!(store.remove(""), Err(StoreError::EmptyKey));
    }

    #[test]
    fn test_typed_roundtrip() {
        let store = InMemoryStore::new();
        store.save("registrationId", &4242u32).unwrap();

        assert_eq!(store.load::<u32>("registrationId").unwrap(), Some(4242));
        assert_eq!(store.require::<u32>("registrationId").unwrap(), 4242);
        assert!(store.contains("registrationId").unwrap());
    }

    #[test]
    fn test_require_missing_key() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.require::<u32>("deviceId"),
            Err(StoreError::MissingKey("deviceId".to_string()))
        );
    }

    #[test]
    fn test_undecodable_value() {
        let store = InMemoryStore::new();
        store.put("userId", vec![1]).unwrap();
        assert!(matches!(
            store.load::<String>("userId"),
            Err(StoreError::Codec { .. })
        ));
    }
}
