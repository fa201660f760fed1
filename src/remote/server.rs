//! Server side of the remote vault: owns the real vaults and answers
//! calls for them.
//!
//! Factory methods (no target): `prepare`, `create`, `open`, `list`,
//! `meta`, `delete`. Instance methods (target = instance number returned
//! by `create`/`open`): `get`, `set`, `delete`, `clear`, `keys`,
//! `entriesAsync`, `seal`, `sealed`, `getUnwrapped`, `setPassword`,
//! `load`, `save`, `meta`, `setMeta`, `release`.
//!
//! Only `getUnwrapped` ever returns private plaintext; every other reply
//! carries public values or handle descriptors.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::endpoint::CallHandler;
use super::protocol::WireValue;
use crate::config::{Context, PrepareOptions};
use crate::crypto::kdf::KdfParams;
use crate::errors::{Result, VaultError};
use crate::revocable::{Revoke, Revoker};
use crate::vault::{Meta, Vault, VaultFactory};

/// Reply to `create` and `open`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedVault {
    pub instance: u64,
    pub id: Uuid,
}

/// Arguments a remote `prepare` may carry. Providers and stores stay
/// server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePrepare {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_argon_params: Option<KdfParams>,
}

struct Instance {
    vault: Vault,
    /// Revokes every value handed out by `getUnwrapped`.
    unwrapped: Revoker,
}

pub struct VaultServer {
    pending: Option<PrepareOptions>,
    factory: Option<VaultFactory>,
    instances: BTreeMap<u64, Instance>,
    next_instance: u64,
}

impl VaultServer {
    /// A server that builds its context from `options` on the first call
    /// (or on a remote `prepare`).
    pub fn new(options: PrepareOptions) -> Self {
        Self {
            pending: Some(options),
            factory: None,
            instances: BTreeMap::new(),
            next_instance: 1,
        }
    }

    /// A server over an existing context.
    pub fn with_context(context: Arc<Context>) -> Self {
        Self {
            pending: None,
            factory: Some(VaultFactory::new(context)),
            instances: BTreeMap::new(),
            next_instance: 1,
        }
    }

    /// Vault instances opened and not yet released.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn prepare(&mut self, remote: Option<RemotePrepare>) -> Result<&VaultFactory> {
        if self.factory.is_some() && remote.is_some() {
            return Err(VaultError::Configuration(
                "prepare() may only be called with arguments once".into(),
            ));
        }
        if self.factory.is_none() {
            let mut options = self.pending.take().unwrap_or_default();
            if let Some(params) = remote.and_then(|r| r.default_argon_params) {
                options.default_kdf_params = Some(params);
            }
            self.factory = Some(VaultFactory::new(Context::new(options)?));
        }
        self.factory
            .as_ref()
            .ok_or_else(|| VaultError::State("vault server has no context".into()))
    }

    fn register(&mut self, vault: Vault) -> OpenedVault {
        let instance = self.next_instance;
        self.next_instance += 1;
        let opened = OpenedVault {
            instance,
            id: vault.id(),
        };
        self.instances.insert(
            instance,
            Instance {
                vault,
                unwrapped: Revoker::new(),
            },
        );
        debug!(instance, id = %opened.id, "registered vault instance");
        opened
    }

    fn instance(&mut self, target: u64) -> Result<&mut Instance> {
        self.instances
            .get_mut(&target)
            .ok_or_else(|| VaultError::NotFound(format!("vault instance {target}")))
    }

    fn factory_call(&mut self, method: &str, args: &[Value]) -> Result<Value> {
        match method {
            "prepare" => {
                self.prepare(arg::<Option<RemotePrepare>>(args, 0)?)?;
                Ok(Value::Null)
            }
            "create" => {
                let vault = self.prepare(None)?.create(None)?;
                to_payload(&self.register(vault))
            }
            "open" => {
                let id = arg::<Option<Uuid>>(args, 0)?;
                let vault = self.prepare(None)?.open(id, None)?;
                to_payload(&self.register(vault))
            }
            "list" => to_payload(&self.prepare(None)?.list()?),
            "meta" => {
                let id = arg::<Uuid>(args, 0)?;
                to_payload(&self.prepare(None)?.meta(&id)?)
            }
            "delete" => {
                let id = arg::<Uuid>(args, 0)?;
                self.prepare(None)?.delete(&id)?;
                Ok(Value::Null)
            }
            other => Err(VaultError::Unsupported(format!(
                "unknown factory method '{other}'"
            ))),
        }
    }

    fn instance_call(&mut self, target: u64, method: &str, args: &[Value]) -> Result<Value> {
        if method == "release" {
            if let Some(instance) = self.instances.remove(&target) {
                instance.unwrapped.revoke();
                instance.vault.revoke();
                debug!(instance = target, "released vault instance");
            }
            return Ok(Value::Null);
        }

        let Instance { vault, unwrapped } = self.instance(target)?;
        match method {
            "get" => {
                let key = arg::<String>(args, 0)?;
                to_payload(&vault.get(&key)?.as_ref().map(WireValue::from))
            }
            "set" => {
                let key = arg::<String>(args, 0)?;
                let value = arg::<Value>(args, 1)?;
                vault.set(&key, value)?;
                Ok(Value::Null)
            }
            "delete" => {
                let key = arg::<String>(args, 0)?;
                Ok(Value::Bool(vault.delete(&key)?))
            }
            "clear" => {
                vault.clear()?;
                Ok(Value::Null)
            }
            "keys" => to_payload(&vault.keys()?),
            "entriesAsync" => {
                let entries: Vec<(String, WireValue)> = vault
                    .entries()?
                    .iter()
                    .map(|(key, value)| (key.clone(), WireValue::from(value)))
                    .collect();
                to_payload(&entries)
            }
            "seal" => {
                vault.seal();
                Ok(Value::Null)
            }
            "sealed" => Ok(Value::Bool(vault.is_sealed())),
            "getUnwrapped" => {
                let key = arg::<String>(args, 0)?;
                match vault.unwrap(unwrapped)?.get(&key)? {
                    // Moved, not cloned: the reply is the only copy and the
                    // serve loop scrubs it once written.
                    Some(value) => {
                        let plaintext = value.with_mut(std::mem::take);
                        value.revoke();
                        plaintext
                    }
                    None => Ok(Value::Null),
                }
            }
            "setPassword" => {
                let password = Zeroizing::new(arg::<String>(args, 0)?);
                vault.set_password(password.as_bytes())?;
                Ok(Value::Null)
            }
            "load" => {
                vault.load()?;
                to_payload(vault.meta())
            }
            "save" => {
                vault.save()?;
                Ok(Value::Null)
            }
            "meta" => to_payload(vault.meta()),
            "setMeta" => {
                *vault.meta_mut() = arg::<Meta>(args, 0)?;
                Ok(Value::Null)
            }
            other => Err(VaultError::Unsupported(format!(
                "unknown vault method '{other}'"
            ))),
        }
    }
}

impl CallHandler for VaultServer {
    fn handle_call(&mut self, target: Option<u64>, method: &str, args: Vec<Value>) -> Result<Value> {
        match target {
            None => self.factory_call(method, &args),
            Some(target) => self.instance_call(target, method, &args),
        }
    }
}

impl Drop for VaultServer {
    fn drop(&mut self) {
        for (_, instance) in std::mem::take(&mut self.instances) {
            instance.unwrapped.revoke();
            instance.vault.revoke();
        }
        info!("vault server shut down");
    }
}

/// Positional argument `index`; a missing argument reads as `null`.
fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T> {
    let value = args.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| VaultError::Protocol(format!("argument {index}: {e}")))
}

fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| VaultError::Serialization(e.to_string()))
}
