//! Ordered key → value collection stored in a [`RawVault`] payload.
//!
//! The plaintext is a JSON array of `[key, value]` pairs sorted by key, so
//! the same entries always serialize to the same bytes.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::envelope::Meta;
use super::raw::RawVault;
use crate::errors::{Result, VaultError};

pub struct CollectionVault<V> {
    raw: RawVault,
    entries: BTreeMap<String, V>,
}

impl<V> CollectionVault<V> {
    pub fn new(raw: RawVault) -> Self {
        Self {
            raw,
            entries: BTreeMap::new(),
        }
    }

    pub fn raw(&self) -> &RawVault {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut RawVault {
        &mut self.raw
    }

    pub fn meta(&self) -> &Meta {
        self.raw.meta()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key)
    }

    /// Remove every entry, handing them back so the caller can release them.
    pub fn take_all(&mut self) -> BTreeMap<String, V> {
        std::mem::take(&mut self.entries)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decrypt and replace the entries, decoding each stored value with
    /// `decode`. On any error the current entries are left untouched.
    pub fn load_with<F>(&mut self, mut decode: F) -> Result<()>
    where
        F: FnMut(&str, Value) -> Result<V>,
    {
        let mut loaded = BTreeMap::new();
        self.raw.load(|bytes| {
            let pairs: Vec<(String, Value)> = serde_json::from_slice(bytes)
                .map_err(|e| VaultError::InvalidFormat(format!("vault payload: {e}")))?;
            for (key, value) in pairs {
                let value = decode(&key, value)?;
                loaded.insert(key, value);
            }
            Ok(())
        })?;
        self.entries = loaded;
        Ok(())
    }

    /// Encode every entry with `encode` and persist them, sorted by key.
    pub fn save_with<F>(&self, mut encode: F) -> Result<()>
    where
        F: FnMut(&str, &V) -> Result<Value>,
    {
        self.raw.save(|| {
            let pairs = self
                .entries
                .iter()
                .map(|(key, value)| Ok((key.as_str(), encode(key, value)?)))
                .collect::<Result<Vec<_>>>()?;
            serde_json::to_vec(&pairs)
                .map_err(|e| VaultError::Serialization(format!("vault payload: {e}")))
        })
    }
}

impl<V: Serialize + DeserializeOwned> CollectionVault<V> {
    pub fn load(&mut self) -> Result<()> {
        self.load_with(|key, value| {
            serde_json::from_value(value)
                .map_err(|e| VaultError::InvalidFormat(format!("entry '{key}': {e}")))
        })
    }

    pub fn save(&self) -> Result<()> {
        self.save_with(|key, value| {
            serde_json::to_value(value)
                .map_err(|e| VaultError::Serialization(format!("entry '{key}': {e}")))
        })
    }
}
