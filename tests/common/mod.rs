//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hdvault::config::{Context, PrepareOptions};
use hdvault::crypto::KdfParams;
use hdvault::errors::{Result, VaultError};
use hdvault::vault::{IsolationEngine, Registry, SecretHandle};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Argon2id cheap enough for tests.
pub fn fast_params() -> KdfParams {
    KdfParams::new(1, 8, 1)
}

/// In-memory context with fast KDF parameters and no isolation engine.
pub fn memory_context() -> Arc<Context> {
    Context::new(fast_options()).expect("context")
}

/// In-memory context whose registry is backed by [`MockEngine`].
pub fn engine_context(engine: Arc<MockEngine>) -> Arc<Context> {
    Context::new(engine_options(engine)).expect("context")
}

pub fn fast_options() -> PrepareOptions {
    PrepareOptions {
        default_kdf_params: Some(fast_params()),
        ..PrepareOptions::default()
    }
}

pub fn engine_options(engine: Arc<MockEngine>) -> PrepareOptions {
    PrepareOptions {
        registry: Some(Registry::with_isolation_engine(engine)),
        ..fast_options()
    }
}

/// Engine that deals out numbered phrases and identifies keys by a
/// SHA-256 fingerprint of the phrase.
#[derive(Default)]
pub struct MockEngine {
    generated: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

pub fn fingerprint(mnemonic: &str) -> String {
    let digest = Sha256::digest(mnemonic.as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

impl IsolationEngine for MockEngine {
    fn generate_mnemonic(&self) -> Result<Zeroizing<String>> {
        let n = self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(Zeroizing::new(format!(
            "legal winner thank year wave sausage worth useful legal winner thank yellow {n}"
        )))
    }

    fn from_mnemonic(&self, mnemonic: &str) -> Result<Arc<dyn SecretHandle>> {
        if mnemonic.is_empty() {
            return Err(VaultError::InvalidFormat("empty mnemonic".into()));
        }
        Ok(Arc::new(MockKey {
            fingerprint: fingerprint(mnemonic),
        }))
    }
}

#[derive(Debug)]
pub struct MockKey {
    pub fingerprint: String,
}

impl SecretHandle for MockKey {
    fn kind(&self) -> &str {
        "hdkey"
    }

    fn public(&self) -> Value {
        json!({ "fingerprint": self.fingerprint })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
