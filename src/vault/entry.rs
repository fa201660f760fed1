//! Entry keys and values of a partitioned vault.
//!
//! Keys starting with `#` are private: their plaintext lives only inside
//! the vault, and readers get an opaque [`SecretHandle`] instead. Every
//! other key is public and stored as plain JSON.

use std::any::Any;
use std::sync::Arc;

use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};

/// Marker that puts a key in the private namespace.
pub const PRIVATE_PREFIX: char = '#';

/// Field of the value that asks a transformer for a fresh secret.
const GENERATE_FIELD: &str = "$generate";

/// A key, classified by namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKey<'a> {
    Public(&'a str),
    Private(&'a str),
}

impl<'a> EntryKey<'a> {
    pub fn parse(key: &'a str) -> Self {
        if key.starts_with(PRIVATE_PREFIX) {
            Self::Private(key)
        } else {
            Self::Public(key)
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Self::Public(name) | Self::Private(name) => name,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// The well-known private entry this key names, if any.
    pub fn kind(&self) -> Option<PrivateKind> {
        match self {
            Self::Private(name) => PrivateKind::from_key(name),
            Self::Public(_) => None,
        }
    }
}

/// Private entries the crate knows how to transform and wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrivateKind {
    /// BIP39 seed phrase, wrapped into a signing-capable key handle.
    Mnemonic,
}

impl PrivateKind {
    pub const ALL: &'static [PrivateKind] = &[PrivateKind::Mnemonic];

    pub fn key(self) -> &'static str {
        match self {
            Self::Mnemonic => "#mnemonic",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.key() == key)
    }
}

/// Value that asks the transformer to generate a fresh secret.
pub fn generate_request() -> Value {
    json!({ GENERATE_FIELD: true })
}

pub fn is_generate_request(value: &Value) -> bool {
    value.get(GENERATE_FIELD).and_then(Value::as_bool) == Some(true)
}

/// Opaque capability produced from a private value.
///
/// A handle can be used (signing, derivation) through its concrete type,
/// but never yields the secret it was built from.
pub trait SecretHandle: Send + Sync {
    /// Short type tag, e.g. `"hdkey"`.
    fn kind(&self) -> &str;

    /// Non-secret descriptor, safe to show or send anywhere.
    fn public(&self) -> Value;

    /// Access to the concrete handle type.
    fn as_any(&self) -> &dyn Any;
}

/// External key-derivation engine. Implementations keep raw key bytes
/// on their side and hand out handles only.
pub trait IsolationEngine: Send + Sync {
    fn generate_mnemonic(&self) -> Result<Zeroizing<String>>;

    fn from_mnemonic(&self, mnemonic: &str) -> Result<Arc<dyn SecretHandle>>;
}

/// What a vault hands out for one entry.
#[derive(Clone)]
pub enum VaultValue {
    /// A public entry.
    Plain(Value),
    /// A private entry, wrapped.
    Handle(Arc<dyn SecretHandle>),
    /// A private entry nothing knows how to wrap.
    Unsupported { key: String },
}

impl VaultValue {
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Arc<dyn SecretHandle>> {
        match self {
            Self::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// The error an operation on an unsupported entry would have raised.
    pub fn unsupported_error(&self) -> Option<VaultError> {
        match self {
            Self::Unsupported { key } => Some(VaultError::Unsupported(format!(
                "no transformer and wrapper registered for '{key}'"
            ))),
            _ => None,
        }
    }
}

impl std::fmt::Debug for VaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Handle(handle) => f
                .debug_struct("Handle")
                .field("kind", &handle.kind())
                .field("public", &handle.public())
                .finish(),
            Self::Unsupported { key } => {
                f.debug_struct("Unsupported").field("key", key).finish()
            }
        }
    }
}
