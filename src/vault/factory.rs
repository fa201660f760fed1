//! Entry point for creating, opening and managing vaults.

use std::sync::Arc;

use uuid::Uuid;

use super::envelope::Meta;
use super::partitioned::Vault;
use super::raw::RawVault;
use crate::config::{self, Context, PrepareOptions};
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct VaultFactory {
    context: Arc<Context>,
}

impl VaultFactory {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    /// Factory over the process-wide context; see [`config::prepare`].
    pub fn prepare(options: Option<PrepareOptions>) -> Result<Self> {
        Ok(Self::new(config::prepare(options)?))
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// A new, empty vault. With a password it is also saved right away,
    /// so it shows up in [`list`](Self::list).
    pub fn create(&self, password: Option<&[u8]>) -> Result<Vault> {
        let mut vault = Vault::open(Arc::clone(&self.context), None)?;
        if let Some(password) = password {
            vault.set_password(password)?;
            vault.save()?;
        }
        Ok(vault)
    }

    /// Open vault `id`, or create one when `id` is `None`. With a
    /// password the entries are loaded as well.
    pub fn open(&self, id: Option<Uuid>, password: Option<&[u8]>) -> Result<Vault> {
        let Some(id) = id else {
            return self.create(password);
        };
        let mut vault = Vault::open(Arc::clone(&self.context), Some(id))?;
        if let Some(password) = password {
            vault.set_password(password)?;
            vault.load()?;
        }
        Ok(vault)
    }

    pub fn list(&self) -> Result<Vec<Uuid>> {
        RawVault::list(&self.context)
    }

    pub fn meta(&self, id: &Uuid) -> Result<Option<Meta>> {
        RawVault::read_meta(&self.context, id)
    }

    pub fn delete(&self, id: &Uuid) -> Result<()> {
        RawVault::delete(&self.context, id)
    }
}
