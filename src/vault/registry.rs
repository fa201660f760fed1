//! Per-key transformers and wrappers for private entries.
//!
//! Registration is open until the first vault is opened from the owning
//! context; after that the tables are frozen and any further registration
//! is a [`VaultError::State`] error.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::debug;

use super::entry::{is_generate_request, EntryKey, IsolationEngine, PrivateKind, SecretHandle};
use crate::errors::{Result, VaultError};

/// Rewrites a raw input value before it is stored.
pub type Transformer = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Turns a stored private value into an opaque handle.
pub type Wrapper = Arc<dyn Fn(&Value) -> Result<Arc<dyn SecretHandle>> + Send + Sync>;

#[derive(Default)]
struct Tables {
    closed: bool,
    transformers: BTreeMap<String, Transformer>,
    wrappers: BTreeMap<String, Wrapper>,
}

/// Shared registry; clones see the same tables.
#[derive(Clone, Default)]
pub struct Registry {
    tables: Arc<Mutex<Tables>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a transformer and wrapper for every [`PrivateKind`],
    /// backed by `engine`.
    pub fn with_isolation_engine(engine: Arc<dyn IsolationEngine>) -> Self {
        let registry = Self::new();
        let mut tables = registry.lock_tables();
        for kind in PrivateKind::ALL {
            let (transformer, wrapper) = match kind {
                PrivateKind::Mnemonic => mnemonic_handlers(Arc::clone(&engine)),
            };
            tables.transformers.insert(kind.key().to_string(), transformer);
            tables.wrappers.insert(kind.key().to_string(), wrapper);
        }
        drop(tables);
        registry
    }

    fn lock_tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn open_tables(&self, key: &str) -> Result<MutexGuard<'_, Tables>> {
        if !EntryKey::parse(key).is_private() {
            return Err(VaultError::Configuration(format!(
                "'{key}' is not a private key; only private keys take transformers and wrappers"
            )));
        }
        let tables = self.lock_tables();
        if tables.closed {
            return Err(VaultError::State(format!(
                "cannot register '{key}': registration is closed"
            )));
        }
        Ok(tables)
    }

    pub fn register_transformer<F>(&self, key: &str, transformer: F) -> Result<()>
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.open_tables(key)?
            .transformers
            .insert(key.to_string(), Arc::new(transformer));
        debug!(key, "registered transformer");
        Ok(())
    }

    pub fn register_wrapper<F>(&self, key: &str, wrapper: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<Arc<dyn SecretHandle>> + Send + Sync + 'static,
    {
        self.open_tables(key)?
            .wrappers
            .insert(key.to_string(), Arc::new(wrapper));
        debug!(key, "registered wrapper");
        Ok(())
    }

    /// Freeze the tables. Idempotent.
    pub fn close(&self) {
        self.lock_tables().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock_tables().closed
    }

    /// Transformer and wrapper for `key`, only if both are registered.
    pub fn handlers(&self, key: EntryKey<'_>) -> Option<(Transformer, Wrapper)> {
        let EntryKey::Private(name) = key else {
            return None;
        };
        let tables = self.lock_tables();
        let transformer = tables.transformers.get(name)?;
        let wrapper = tables.wrappers.get(name)?;
        Some((Arc::clone(transformer), Arc::clone(wrapper)))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.lock_tables();
        f.debug_struct("Registry")
            .field("closed", &tables.closed)
            .field("transformers", &tables.transformers.keys().collect::<Vec<_>>())
            .field("wrappers", &tables.wrappers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn mnemonic_handlers(engine: Arc<dyn IsolationEngine>) -> (Transformer, Wrapper) {
    let generator = Arc::clone(&engine);
    let transformer: Transformer = Arc::new(move |value: Value| {
        if is_generate_request(&value) {
            let mnemonic = generator.generate_mnemonic()?;
            return Ok(Value::String(mnemonic.to_string()));
        }
        match value.as_str() {
            Some(phrase) => Ok(Value::String(
                phrase.split_whitespace().collect::<Vec<_>>().join(" "),
            )),
            None => Err(VaultError::InvalidFormat(
                "#mnemonic must be a string or a generate request".into(),
            )),
        }
    });

    let wrapper: Wrapper = Arc::new(move |value: &Value| {
        let phrase = value
            .as_str()
            .ok_or_else(|| VaultError::InvalidFormat("#mnemonic must be a string".into()))?;
        engine.from_mnemonic(phrase)
    });

    (transformer, wrapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::entry::generate_request;
    use serde_json::json;
    use std::any::Any;
    use zeroize::Zeroizing;

    struct Handle(String);

    impl SecretHandle for Handle {
        fn kind(&self) -> &str {
            "test"
        }
        fn public(&self) -> Value {
            json!({ "words": self.0.split(' ').count() })
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Engine;

    impl IsolationEngine for Engine {
        fn generate_mnemonic(&self) -> Result<Zeroizing<String>> {
            Ok(Zeroizing::new("zoo zoo zoo".to_string()))
        }
        fn from_mnemonic(&self, mnemonic: &str) -> Result<Arc<dyn SecretHandle>> {
            Ok(Arc::new(Handle(mnemonic.to_string())))
        }
    }

    #[test]
    fn registration_closes() {
        let registry = Registry::new();
        registry
            .register_transformer("#seed", |value| Ok(value))
            .unwrap();
        registry.close();
        registry.close();

        assert!(matches!(
            registry.register_wrapper("#seed", |_| Err(VaultError::Revoked)),
            Err(VaultError::State(_))
        ));
    }

    #[test]
    fn public_keys_cannot_be_registered() {
        let registry = Registry::new();
        assert!(matches!(
            registry.register_transformer("label", |value| Ok(value)),
            Err(VaultError::Configuration(_))
        ));
    }

    #[test]
    fn handlers_require_both_halves() {
        let registry = Registry::new();
        registry
            .register_transformer("#seed", |value| Ok(value))
            .unwrap();
        assert!(registry.handlers(EntryKey::parse("#seed")).is_none());

        registry
            .register_wrapper("#seed", |value| {
                Ok(Arc::new(Handle(value.to_string())) as Arc<dyn SecretHandle>)
            })
            .unwrap();
        assert!(registry.handlers(EntryKey::parse("#seed")).is_some());
        assert!(registry.handlers(EntryKey::parse("seed")).is_none());
    }

    #[test]
    fn mnemonic_handlers_normalise_and_generate() {
        let registry = Registry::with_isolation_engine(Arc::new(Engine));
        let (transform, wrap) = registry
            .handlers(EntryKey::parse(PrivateKind::Mnemonic.key()))
            .unwrap();

        let stored = transform(Value::from("  abandon   ability\table ")).unwrap();
        assert_eq!(stored, "abandon ability able");

        let generated = transform(generate_request()).unwrap();
        assert_eq!(generated, "zoo zoo zoo");

        let handle = wrap(&stored).unwrap();
        assert_eq!(handle.kind(), "test");
        assert_eq!(handle.public()["words"], 3);

        assert!(transform(json!(42)).is_err());
    }
}
