//! Provider injection.
//!
//! A [`Context`] bundles everything a vault needs from its environment:
//! the cryptography backend, a monotonic clock, the two persisted stores
//! and the private-entry registry. It also owns the two process-wide,
//! lazily computed values: the machine secret and the default KDF
//! parameters. Both are computed at most once per context, under a lock,
//! so concurrent first use cannot trigger duplicate benchmarking.
//!
//! [`prepare`] manages a write-once, process-wide context. Embedders and
//! tests that want isolation build their own with [`Context::new`] or a
//! private [`ContextCell`].

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::benchmark::{BenchmarkOptions, BenchmarkResult, KdfBenchmark};
use crate::clock::{Clock, MonotonicClock};
use crate::crypto::kdf::KdfParams;
use crate::crypto::keys::MachineSecret;
use crate::crypto::provider::{CryptoProvider, DefaultCrypto};
use crate::errors::{Result, VaultError};
use crate::store::{KeyValueStore, MemoryStore};
use crate::vault::registry::Registry;

/// Key-store entry holding the machine secret.
pub const MACHINE_SEED_KEY: &str = "machineSeed";
/// Key-store entry holding the default KDF parameters.
pub const DEFAULT_ARGON_PARAMS_KEY: &str = "defaultArgonParams";
/// Key-store entry holding the last calibration run.
pub const BENCHMARK_RESULTS_KEY: &str = "argonBenchmarkResults";

/// Everything `prepare()` may be given. Unset fields get defaults.
#[derive(Default)]
pub struct PrepareOptions {
    pub crypto: Option<Arc<dyn CryptoProvider>>,
    pub clock: Option<Arc<dyn Clock>>,
    pub key_store: Option<Arc<dyn KeyValueStore>>,
    pub vault_store: Option<Arc<dyn KeyValueStore>>,
    /// Skip calibration and use these for new vaults.
    pub default_kdf_params: Option<KdfParams>,
    /// Calibration target used when no default params exist yet.
    pub calibration: Option<BenchmarkOptions>,
    pub registry: Option<Registry>,
}

/// A calibration run as persisted in the key store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBenchmark {
    pub options: BenchmarkOptions,
    pub result: BenchmarkResult,
    pub measured_at: DateTime<Utc>,
}

pub struct Context {
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
    key_store: Arc<dyn KeyValueStore>,
    vault_store: Arc<dyn KeyValueStore>,
    calibration: BenchmarkOptions,
    registry: Registry,
    machine_secret: Mutex<Option<Arc<MachineSecret>>>,
    default_kdf_params: Mutex<Option<KdfParams>>,
}

impl Context {
    pub fn new(options: PrepareOptions) -> Result<Arc<Self>> {
        let key_store: Arc<dyn KeyValueStore> = options
            .key_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        if let Some(params) = &options.default_kdf_params {
            params.validate()?;
            key_store.set(DEFAULT_ARGON_PARAMS_KEY, &to_json(params)?)?;
        }

        Ok(Arc::new(Self {
            crypto: options.crypto.unwrap_or_else(|| Arc::new(DefaultCrypto)),
            clock: options
                .clock
                .unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            key_store,
            vault_store: options
                .vault_store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            calibration: options.calibration.unwrap_or_default(),
            registry: options.registry.unwrap_or_default(),
            machine_secret: Mutex::new(None),
            default_kdf_params: Mutex::new(options.default_kdf_params),
        }))
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn key_store(&self) -> &dyn KeyValueStore {
        self.key_store.as_ref()
    }

    pub fn vault_store(&self) -> &dyn KeyValueStore {
        self.vault_store.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The per-installation root secret, loaded or created on first use.
    pub fn machine_secret(&self) -> Result<Arc<MachineSecret>> {
        let mut slot = lock(&self.machine_secret)?;
        if let Some(secret) = slot.as_ref() {
            return Ok(Arc::clone(secret));
        }

        let secret = match self.key_store.get(MACHINE_SEED_KEY)? {
            Some(bytes) => MachineSecret::from_bytes(&bytes)?,
            None => {
                let secret = MachineSecret::generate(self.crypto())?;
                self.key_store
                    .set(MACHINE_SEED_KEY, secret.persisted_bytes())?;
                info!("generated new machine secret");
                secret
            }
        };

        let secret = Arc::new(secret);
        *slot = Some(Arc::clone(&secret));
        Ok(secret)
    }

    /// KDF parameters for new vaults: persisted value, or a fresh
    /// calibration run if none exists.
    pub fn default_kdf_params(&self) -> Result<KdfParams> {
        let mut slot = lock(&self.default_kdf_params)?;
        if let Some(params) = *slot {
            return Ok(params);
        }

        let params = match self.key_store.get(DEFAULT_ARGON_PARAMS_KEY)? {
            Some(bytes) => from_json::<KdfParams>(&bytes)?,
            None => {
                debug!(target_ms = self.calibration.target_time_ms, "calibrating Argon2id");
                let result =
                    KdfBenchmark::new(self.clock(), self.crypto()).run(&self.calibration)?;
                let params = result.kdf_params(&self.calibration);
                let stored = StoredBenchmark {
                    options: self.calibration,
                    result,
                    measured_at: Utc::now(),
                };
                self.key_store
                    .set(BENCHMARK_RESULTS_KEY, &to_json(&stored)?)?;
                self.key_store
                    .set(DEFAULT_ARGON_PARAMS_KEY, &to_json(&params)?)?;
                params
            }
        };

        *slot = Some(params);
        Ok(params)
    }

    /// The last persisted calibration run, if any.
    pub fn benchmark_results(&self) -> Result<Option<StoredBenchmark>> {
        self.key_store
            .get(BENCHMARK_RESULTS_KEY)?
            .map(|bytes| from_json(&bytes))
            .transpose()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

/// A write-once slot for a [`Context`].
///
/// `prepare(Some(..))` succeeds once; a later `prepare(None)` returns the
/// existing context; a later `prepare(Some(..))` is a configuration
/// error. `prepare(None)` on an empty slot initialises defaults.
#[derive(Default)]
pub struct ContextCell {
    slot: Mutex<Option<Arc<Context>>>,
}

impl ContextCell {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn prepare(&self, options: Option<PrepareOptions>) -> Result<Arc<Context>> {
        let mut slot = lock(&self.slot)?;
        match (slot.as_ref(), options) {
            (Some(context), None) => Ok(Arc::clone(context)),
            (Some(_), Some(_)) => Err(VaultError::Configuration(
                "prepare() may only be called with arguments once".into(),
            )),
            (None, options) => {
                let context = Context::new(options.unwrap_or_default())?;
                *slot = Some(Arc::clone(&context));
                Ok(context)
            }
        }
    }

    /// The prepared context, initialising defaults if needed.
    pub fn get(&self) -> Result<Arc<Context>> {
        self.prepare(None)
    }

    pub fn is_prepared(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

static GLOBAL: ContextCell = ContextCell::new();

/// Configure the process-wide context. See [`ContextCell::prepare`].
pub fn prepare(options: Option<PrepareOptions>) -> Result<Arc<Context>> {
    GLOBAL.prepare(options)
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| VaultError::State("context lock poisoned".into()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| VaultError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| VaultError::InvalidFormat(e.to_string()))
}
