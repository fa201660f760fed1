//! Password-derived envelope storage for one vault id.
//!
//! `RawVault` knows nothing about what the plaintext means: `load` hands
//! decrypted bytes to a caller-supplied deserializer and `save` asks a
//! caller-supplied serializer for them.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::envelope::{Envelope, Meta, ProtectedHeader};
use crate::config::Context;
use crate::crypto::kdf::KdfParams;
use crate::crypto::keys::VaultKey;
use crate::errors::{Result, VaultError};

pub struct RawVault {
    context: Arc<Context>,
    id: Uuid,
    kdf_params: KdfParams,
    meta: Meta,
    vault_key: Option<VaultKey>,
}

impl RawVault {
    /// Open an existing vault, or allocate a new one when `id` is `None`.
    ///
    /// A new vault takes the process default KDF parameters (calibrating
    /// them first if none exist). An existing vault keeps the parameters
    /// recorded in its own envelope header.
    pub fn open(context: Arc<Context>, id: Option<Uuid>) -> Result<Self> {
        match id {
            None => {
                let id = Uuid::new_v4();
                let kdf_params = context.default_kdf_params()?;
                info!(%id, "allocated new vault");
                Ok(Self {
                    context,
                    id,
                    kdf_params,
                    meta: Meta::new(),
                    vault_key: None,
                })
            }
            Some(id) => {
                let header = read_header(&context, &id)?
                    .ok_or_else(|| VaultError::NotFound(format!("vault {id}")))?;
                let kdf_params = header
                    .argon
                    .filter(|params| params.validate().is_ok())
                    .ok_or_else(|| {
                        VaultError::NotFound(format!("vault {id} has no usable KDF parameters"))
                    })?;
                debug!(%id, "opened vault header");
                Ok(Self {
                    context,
                    id,
                    kdf_params,
                    meta: header.meta,
                    vault_key: None,
                })
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.kdf_params
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Header metadata is written on the next `save`.
    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    pub fn has_password(&self) -> bool {
        self.vault_key.is_some()
    }

    /// Derive the vault key. Required before `load` and `save`.
    pub fn set_password(&mut self, password: &[u8]) -> Result<()> {
        let secret = self.context.machine_secret()?;
        let key = secret.derive_vault_key(
            self.context.crypto(),
            &self.id,
            password,
            &self.kdf_params,
        )?;
        self.vault_key = Some(key);
        Ok(())
    }

    fn vault_key(&self) -> Result<&VaultKey> {
        self.vault_key
            .as_ref()
            .ok_or_else(|| VaultError::State("no password set for this vault".into()))
    }

    /// Decrypt the stored envelope and pass its plaintext to `deserialize`.
    ///
    /// `meta` is refreshed from the stored header only if `deserialize`
    /// succeeds.
    pub fn load<F>(&mut self, deserialize: F) -> Result<()>
    where
        F: FnOnce(&[u8]) -> Result<()>,
    {
        let key = self.vault_key()?;
        let bytes = self
            .context
            .vault_store()
            .get(&self.id.to_string())?
            .ok_or_else(|| VaultError::NotFound(format!("vault {}", self.id)))?;
        let envelope = Envelope::from_bytes(&bytes)?;

        let plaintext = envelope.open(self.context.crypto(), key)?;
        let header = envelope.header()?;
        deserialize(&plaintext)?;

        self.meta = header.meta;
        debug!(id = %self.id, "loaded vault");
        Ok(())
    }

    /// Encrypt whatever `serialize` produces and persist it under this id.
    pub fn save<F>(&self, serialize: F) -> Result<()>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let key = self.vault_key()?;
        let plaintext = Zeroizing::new(serialize()?);
        let header = ProtectedHeader::new(self.kdf_params, self.meta.clone());

        let envelope = Envelope::seal(self.context.crypto(), key, &header, &plaintext)?;
        self.context
            .vault_store()
            .set(&self.id.to_string(), &envelope.to_bytes()?)?;
        debug!(id = %self.id, "saved vault");
        Ok(())
    }

    /// Ids of every persisted vault. Needs no key material.
    pub fn list(context: &Context) -> Result<Vec<Uuid>> {
        Ok(context
            .vault_store()
            .keys()?
            .iter()
            .filter_map(|key| Uuid::parse_str(key).ok())
            .collect())
    }

    /// Header metadata of a persisted vault, or `None` if there is none.
    pub fn read_meta(context: &Context, id: &Uuid) -> Result<Option<Meta>> {
        Ok(read_header(context, id)?.map(|header| header.meta))
    }

    /// Remove a persisted vault. Deleting an unknown id is not an error.
    pub fn delete(context: &Context, id: &Uuid) -> Result<()> {
        context.vault_store().delete(&id.to_string())?;
        info!(%id, "deleted vault");
        Ok(())
    }
}

impl std::fmt::Debug for RawVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawVault")
            .field("id", &self.id)
            .field("kdf_params", &self.kdf_params)
            .field("has_password", &self.has_password())
            .finish_non_exhaustive()
    }
}

fn read_header(context: &Context, id: &Uuid) -> Result<Option<ProtectedHeader>> {
    match context.vault_store().get(&id.to_string())? {
        Some(bytes) => Envelope::from_bytes(&bytes)?.header().map(Some),
        None => Ok(None),
    }
}
