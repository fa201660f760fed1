//! Client-side proxies that mirror [`VaultFactory`](crate::vault::VaultFactory)
//! and [`Vault`](crate::vault::Vault) over a [`Connection`].
//!
//! Private entries come back as [`RemoteHandle`](super::protocol::RemoteHandle)
//! descriptors; only [`RemoteVault::get_unwrapped`] returns plaintext.

use std::io::{Read, Write};

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::endpoint::{Connection, Endpoint};
use super::protocol::WireValue;
use super::server::{OpenedVault, RemotePrepare};
use crate::crypto::kdf::KdfParams;
use crate::errors::{Result, VaultError};
use crate::revocable::{Revoke, Revoker};
use crate::vault::{Meta, VaultValue};

#[derive(Debug)]
pub struct RemoteVaultFactory {
    endpoint: Endpoint,
}

impl RemoteVaultFactory {
    pub fn new(connection: Connection) -> Self {
        Self {
            endpoint: Endpoint::new(connection, None),
        }
    }

    /// Factory over a fresh connection on `reader`/`writer`.
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::new(Connection::new(reader, writer))
    }

    /// Configure the server's context. Only KDF defaults can be sent;
    /// providers and stores are chosen server-side.
    pub fn prepare(&self, default_kdf_params: Option<KdfParams>) -> Result<()> {
        let args = match default_kdf_params {
            Some(params) => vec![serde_json::to_value(RemotePrepare {
                default_argon_params: Some(params),
            })
            .map_err(|e| VaultError::Serialization(e.to_string()))?],
            None => Vec::new(),
        };
        self.endpoint.call("prepare", args).map(drop)
    }

    fn attach(&self, opened: OpenedVault) -> RemoteVault {
        RemoteVault {
            endpoint: Endpoint::new(self.endpoint.connection().clone(), Some(opened.instance)),
            id: opened.id,
        }
    }

    /// Run `setup` on a freshly opened instance. On failure the server-side
    /// instance is released, since the caller never gets a handle to it.
    fn finish<F>(&self, opened: OpenedVault, setup: F) -> Result<RemoteVault>
    where
        F: FnOnce(&RemoteVault) -> Result<()>,
    {
        let instance = opened.instance;
        let vault = self.attach(opened);
        if let Err(e) = setup(&vault) {
            let release = Endpoint::new(self.endpoint.connection().clone(), Some(instance));
            if let Err(release_error) = release.call("release", Vec::new()) {
                debug!(instance, error = %release_error, "could not release failed vault instance");
            }
            vault.endpoint.revoke();
            return Err(e);
        }
        Ok(vault)
    }

    /// A new vault. With a password it is saved right away.
    ///
    /// The password is sent to the vault instance, not the factory, so a
    /// failure only revokes that instance.
    pub fn create(&self, password: Option<&str>) -> Result<RemoteVault> {
        let opened = self.endpoint.call_as("create", Vec::new())?;
        self.finish(opened, |vault| match password {
            Some(password) => {
                vault.set_password(password)?;
                vault.save()
            }
            None => Ok(()),
        })
    }

    /// Open vault `id` (or create one for `None`); with a password, also
    /// load it. A wrong password revokes the returned vault's endpoint,
    /// not the factory.
    pub fn open(&self, id: Option<Uuid>, password: Option<&str>) -> Result<RemoteVault> {
        let Some(id) = id else {
            return self.create(password);
        };
        let opened = self.endpoint.call_as("open", vec![json!(id)])?;
        self.finish(opened, |vault| match password {
            Some(password) => {
                vault.set_password(password)?;
                vault.load()
            }
            None => Ok(()),
        })
    }

    pub fn list(&self) -> Result<Vec<Uuid>> {
        self.endpoint.call_as("list", Vec::new())
    }

    pub fn meta(&self, id: &Uuid) -> Result<Option<Meta>> {
        self.endpoint.call_as("meta", vec![json!(id)])
    }

    pub fn delete(&self, id: &Uuid) -> Result<()> {
        self.endpoint.call("delete", vec![json!(id)]).map(drop)
    }
}

impl Revoke for RemoteVaultFactory {
    fn revoker(&self) -> &Revoker {
        self.endpoint.revoker()
    }
}

/// Proxy for one server-side vault instance.
#[derive(Debug)]
pub struct RemoteVault {
    endpoint: Endpoint,
    id: Uuid,
}

impl RemoteVault {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn meta(&self) -> Result<Meta> {
        self.endpoint.call_as("meta", Vec::new())
    }

    /// Replace the header metadata written by the next `save`.
    pub fn set_meta(&self, meta: &Meta) -> Result<()> {
        self.endpoint.call("setMeta", vec![json!(meta)]).map(drop)
    }

    pub fn is_sealed(&self) -> Result<bool> {
        self.endpoint.call_as("sealed", Vec::new())
    }

    pub fn get(&self, key: &str) -> Result<Option<VaultValue>> {
        let value: Option<WireValue> = self.endpoint.call_as("get", vec![json!(key)])?;
        Ok(value.map(VaultValue::from))
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.endpoint
            .call("set", vec![json!(key), value])
            .map(drop)
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.endpoint.call_as("delete", vec![json!(key)])
    }

    pub fn clear(&self) -> Result<()> {
        self.endpoint.call("clear", Vec::new()).map(drop)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.endpoint.call_as("keys", Vec::new())
    }

    /// Every entry, resolved, sorted by key.
    pub fn entries(&self) -> Result<Vec<(String, VaultValue)>> {
        let entries: Vec<(String, WireValue)> = self.endpoint.call_as("entriesAsync", Vec::new())?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| (key, VaultValue::from(value)))
            .collect())
    }

    pub fn seal(&self) -> Result<()> {
        self.endpoint.call("seal", Vec::new()).map(drop)
    }

    /// Decrypted value of `key`. Fails once the vault is sealed.
    pub fn get_unwrapped(&self, key: &str) -> Result<Option<Value>> {
        let value = self.endpoint.call("getUnwrapped", vec![json!(key)])?;
        Ok((!value.is_null()).then_some(value))
    }

    pub fn set_password(&self, password: &str) -> Result<()> {
        self.endpoint
            .call("setPassword", vec![json!(password)])
            .map(drop)
    }

    pub fn load(&self) -> Result<()> {
        self.endpoint.call("load", Vec::new()).map(drop)
    }

    pub fn save(&self) -> Result<()> {
        self.endpoint.call("save", Vec::new()).map(drop)
    }

    /// Drop the server-side instance and revoke this proxy.
    pub fn release(self) -> Result<()> {
        let result = self.endpoint.call("release", Vec::new()).map(drop);
        self.endpoint.revoke();
        result
    }
}

impl Drop for RemoteVault {
    /// Best-effort release for proxies that were never released explicitly.
    fn drop(&mut self) {
        if self.endpoint.is_revoked() {
            return;
        }
        if let Err(e) = self.endpoint.call("release", Vec::new()) {
            debug!(id = %self.id, error = %e, "could not release vault instance on drop");
        }
        self.endpoint.revoke();
    }
}

impl Revoke for RemoteVault {
    fn revoker(&self) -> &Revoker {
        self.endpoint.revoker()
    }
}
