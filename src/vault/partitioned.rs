//! The vault callers actually use: public/private entries, seal/unwrap,
//! revocation.
//!
//! Private entries are held twice in memory, neither time as plaintext:
//! once encrypted under a session-only [`ShieldingKey`] (so the vault can
//! re-serialize or unwrap them) and once as the wrapper's opaque handle
//! (what `get` returns). Plaintext only exists transiently during `load`,
//! `save`, `set` and [`Unwrapped::get`].
//!
//! ```text
//! NoKey ──set_password──▶ KeySet ──load──▶ Loaded
//! Unsealed ──seal──▶ Sealed
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::collection::CollectionVault;
use super::entry::{EntryKey, VaultValue};
use super::envelope::Meta;
use super::raw::RawVault;
use crate::config::Context;
use crate::crypto::keys::ShieldingKey;
use crate::errors::{Result, VaultError};
use crate::revocable::{Revocable, Revoke, Revoker};

enum Slot {
    Public(Value),
    Private(PrivateSlot),
}

struct PrivateSlot {
    shielded: Vec<u8>,
    wrapped: VaultValue,
    /// Fires when the entry is replaced, deleted or cleared.
    revoker: Revoker,
}

impl Slot {
    fn release(self) {
        if let Slot::Private(slot) = self {
            slot.revoker.revoke();
        }
    }
}

pub struct Vault {
    collection: CollectionVault<Slot>,
    shielding_key: Revocable<ShieldingKey>,
    revoker: Revoker,
    sealed: bool,
    loaded: bool,
}

impl Vault {
    /// Open (or, with `None`, create) a vault. Closes the context's
    /// registry to further registration.
    pub fn open(context: Arc<Context>, id: Option<Uuid>) -> Result<Self> {
        context.registry().close();
        let shielding_key = ShieldingKey::generate(context.crypto())?;
        let raw = RawVault::open(context, id)?;

        let revoker = Revoker::new();
        Ok(Self {
            collection: CollectionVault::new(raw),
            shielding_key: Revocable::attach(shielding_key, &revoker),
            revoker,
            sealed: false,
            loaded: false,
        })
    }

    fn context(&self) -> &Arc<Context> {
        self.collection.raw().context()
    }

    pub fn id(&self) -> Uuid {
        self.collection.raw().id()
    }

    pub fn meta(&self) -> &Meta {
        self.collection.meta()
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        self.collection.raw_mut().meta_mut()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn has_password(&self) -> bool {
        self.collection.raw().has_password()
    }

    fn require_key(&self) -> Result<()> {
        self.revoker.check()?;
        if !self.has_password() {
            return Err(VaultError::State(format!(
                "vault {} has no password set",
                self.id()
            )));
        }
        Ok(())
    }

    fn shield(&self, key: &str, value: &Value) -> Result<Vec<u8>> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(value)
                .map_err(|e| VaultError::Serialization(format!("entry '{key}': {e}")))?,
        );
        let crypto = self.context().crypto();
        self.shielding_key
            .with(|shielding| shielding.shield(crypto, key, &plaintext))?
    }

    fn unshield(&self, key: &str, shielded: &[u8]) -> Result<Value> {
        let crypto = self.context().crypto();
        let plaintext = self
            .shielding_key
            .with(|shielding| shielding.unshield(crypto, key, shielded))??;
        serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::InvalidFormat(format!("entry '{key}': {e}")))
    }

    /// Wrap a stored private value, or fall back to the inert sentinel.
    fn wrap(&self, key: EntryKey<'_>, value: &Value) -> Result<VaultValue> {
        match self.context().registry().handlers(key) {
            Some((_, wrapper)) => Ok(VaultValue::Handle(wrapper(value)?)),
            None => Ok(VaultValue::Unsupported {
                key: key.name().to_string(),
            }),
        }
    }

    fn private_slot(&self, key: EntryKey<'_>, value: &Value) -> Result<Slot> {
        Ok(Slot::Private(PrivateSlot {
            shielded: self.shield(key.name(), value)?,
            wrapped: self.wrap(key, value)?,
            revoker: self.revoker.child(),
        }))
    }

    /// The stored value: plain for public keys, a handle (or the
    /// unsupported sentinel) for private ones.
    pub fn get(&self, key: &str) -> Result<Option<VaultValue>> {
        self.require_key()?;
        Ok(self.collection.get(key).map(|slot| match slot {
            Slot::Public(value) => VaultValue::Plain(value.clone()),
            Slot::Private(slot) => slot.wrapped.clone(),
        }))
    }

    /// Store `value`. Private values go through the key's transformer
    /// first; keys without a registered transformer and wrapper are kept
    /// as-is behind the unsupported sentinel.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.require_key()?;
        let entry = EntryKey::parse(key);

        let slot = match entry {
            EntryKey::Public(_) => Slot::Public(value),
            EntryKey::Private(_) => {
                let value = match self.context().registry().handlers(entry) {
                    Some((transformer, _)) => transformer(value)?,
                    None => value,
                };
                self.private_slot(entry, &value)?
            }
        };

        if let Some(previous) = self.collection.insert(key.to_string(), slot) {
            previous.release();
        }
        debug!(id = %self.id(), key, "set entry");
        Ok(())
    }

    /// Remove one entry, revoking any unwrapped copies of it.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.require_key()?;
        match self.collection.remove(key) {
            Some(slot) => {
                slot.release();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&mut self) -> Result<()> {
        self.require_key()?;
        for (_, slot) in self.collection.take_all() {
            slot.release();
        }
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.require_key()?;
        Ok(self.collection.keys().cloned().collect())
    }

    /// Every entry as [`get`](Self::get) would return it, sorted by key.
    pub fn entries(&self) -> Result<Vec<(String, VaultValue)>> {
        self.require_key()?;
        Ok(self
            .collection
            .iter()
            .map(|(key, slot)| {
                let value = match slot {
                    Slot::Public(value) => VaultValue::Plain(value.clone()),
                    Slot::Private(slot) => slot.wrapped.clone(),
                };
                (key.clone(), value)
            })
            .collect())
    }

    /// Permanently refuse `unwrap` on this instance. Idempotent.
    pub fn seal(&mut self) {
        if !self.sealed {
            self.sealed = true;
            debug!(id = %self.id(), "sealed vault");
        }
    }

    /// A view that decrypts private entries. Every value it returns is
    /// revoked when `revoker` fires, or when its entry is replaced,
    /// deleted or cleared.
    pub fn unwrap(&self, revoker: &Revoker) -> Result<Unwrapped<'_>> {
        self.require_key()?;
        if self.sealed {
            return Err(VaultError::State(format!(
                "vault {} is sealed; unwrap is not allowed",
                self.id()
            )));
        }
        Ok(Unwrapped {
            vault: self,
            revoker: revoker.clone(),
        })
    }

    /// Derive the vault key from `password`.
    pub fn set_password(&mut self, password: &[u8]) -> Result<()> {
        self.revoker.check()?;
        self.collection.raw_mut().set_password(password)
    }

    /// Replace all entries with the persisted ones.
    pub fn load(&mut self) -> Result<()> {
        self.require_key()?;
        let context = Arc::clone(self.context());
        let shielding_key = self.shielding_key.clone();
        let revoker = self.revoker.clone();

        let previous = self.collection.take_all();
        let result = self.collection.load_with(|key, value| {
            let entry = EntryKey::parse(key);
            if !entry.is_private() {
                return Ok(Slot::Public(value));
            }
            let plaintext = Zeroizing::new(
                serde_json::to_vec(&value)
                    .map_err(|e| VaultError::Serialization(format!("entry '{key}': {e}")))?,
            );
            let shielded = shielding_key
                .with(|shielding| shielding.shield(context.crypto(), key, &plaintext))??;
            let wrapped = match context.registry().handlers(entry) {
                Some((_, wrapper)) => VaultValue::Handle(wrapper(&value)?),
                None => VaultValue::Unsupported {
                    key: key.to_string(),
                },
            };
            Ok(Slot::Private(PrivateSlot {
                shielded,
                wrapped,
                revoker: revoker.child(),
            }))
        });

        if let Err(e) = result {
            for (key, slot) in previous {
                self.collection.insert(key, slot);
            }
            return Err(e);
        }
        for (_, slot) in previous {
            slot.release();
        }
        self.loaded = true;
        info!(id = %self.id(), entries = self.collection.len(), "loaded vault");
        Ok(())
    }

    /// Persist all entries, decrypting private ones only for the duration
    /// of the write.
    pub fn save(&self) -> Result<()> {
        self.require_key()?;
        self.collection.save_with(|key, slot| match slot {
            Slot::Public(value) => Ok(value.clone()),
            Slot::Private(slot) => self.unshield(key, &slot.shielded),
        })?;
        info!(id = %self.id(), entries = self.collection.len(), "saved vault");
        Ok(())
    }
}

impl Revoke for Vault {
    fn revoker(&self) -> &Revoker {
        &self.revoker
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("id", &self.id())
            .field("sealed", &self.sealed)
            .field("loaded", &self.loaded)
            .field("revoked", &self.revoker.is_revoked())
            .finish_non_exhaustive()
    }
}

/// Unsealed view of a [`Vault`] that resolves private entries to their
/// plaintext.
pub struct Unwrapped<'a> {
    vault: &'a Vault,
    revoker: Revoker,
}

impl Unwrapped<'_> {
    pub fn get(&self, key: &str) -> Result<Option<Revocable<Value>>> {
        self.vault.require_key()?;
        let Some(slot) = self.vault.collection.get(key) else {
            return Ok(None);
        };

        let value = match slot {
            Slot::Public(value) => Revocable::attach(value.clone(), &self.revoker),
            Slot::Private(private) => {
                let plaintext = self.vault.unshield(key, &private.shielded)?;
                let value = Revocable::attach(plaintext, &private.revoker);
                self.revoker.adopt(value.revoker());
                value
            }
        };
        Ok(Some(value))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.vault.keys()
    }
}
