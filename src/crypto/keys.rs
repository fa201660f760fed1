//! Key hierarchy.
//!
//! ```text
//! MachineSecret ──HKDF(salt=vault id, info="argonSalt")──▶ argon salt (16 B)
//! password ──Argon2id(argon salt, KdfParams)──▶ argon key (32 B)
//! MachineSecret ──HKDF(salt=vault id, info=argon key)──▶ VaultKey
//! ```
//!
//! None of these types hand out their raw bytes to callers outside the
//! crate: a `VaultKey` can only wrap and unwrap content keys, a
//! `ShieldingKey` can only shield and unshield entry values.

use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::kdf::{KdfParams, KEY_LEN};
use super::provider::CryptoProvider;
use crate::errors::{Result, VaultError};

/// Length of the per-vault Argon2 salt (128 bits).
pub const ARGON_SALT_LEN: usize = 16;

/// HKDF domain label for the Argon2 salt.
const ARGON_SALT_INFO: &[u8] = b"argonSalt";

/// Per-installation root key material.
///
/// Created once, persisted in the key store and reused for every vault.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MachineSecret {
    bytes: [u8; KEY_LEN],
}

impl MachineSecret {
    /// Generate fresh random machine secret material.
    pub fn generate(crypto: &dyn CryptoProvider) -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        crypto.fill_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Restore a machine secret loaded from the key store.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| {
            VaultError::InvalidFormat(format!(
                "machine secret must be {KEY_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Raw bytes, for persisting to the key store only.
    pub(crate) fn persisted_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Deterministic Argon2 salt for one vault.
    pub fn argon_salt(
        &self,
        crypto: &dyn CryptoProvider,
        vault_id: &Uuid,
    ) -> Result<[u8; ARGON_SALT_LEN]> {
        let mut salt = [0u8; ARGON_SALT_LEN];
        crypto.hkdf(&self.bytes, vault_id.as_bytes(), ARGON_SALT_INFO, &mut salt)?;
        Ok(salt)
    }

    /// Run the full derivation pipeline for one vault and password.
    pub fn derive_vault_key(
        &self,
        crypto: &dyn CryptoProvider,
        vault_id: &Uuid,
        password: &[u8],
        params: &KdfParams,
    ) -> Result<VaultKey> {
        let salt = self.argon_salt(crypto, vault_id)?;
        let argon_key = crypto.argon2id(password, &salt, params)?;

        let mut bytes = [0u8; KEY_LEN];
        crypto.hkdf(&self.bytes, vault_id.as_bytes(), &argon_key[..], &mut bytes)?;
        Ok(VaultKey { bytes })
    }
}

impl std::fmt::Debug for MachineSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MachineSecret([REDACTED])")
    }
}

/// Per-vault key-wrapping key. Never persisted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    bytes: [u8; KEY_LEN],
}

impl VaultKey {
    /// Wrap a content-encryption key (GCM key wrap).
    pub fn wrap(&self, crypto: &dyn CryptoProvider, cek: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
        crypto.aead_encrypt(&self.bytes, cek, &[])
    }

    /// Unwrap a content-encryption key. A wrong vault key is an
    /// [`VaultError::Authentication`] failure.
    pub fn unwrap_key(
        &self,
        crypto: &dyn CryptoProvider,
        wrapped: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let raw = Zeroizing::new(crypto.aead_decrypt(&self.bytes, wrapped, &[])?);
        let cek: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::Authentication)?;
        Ok(Zeroizing::new(cek))
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Session-only key protecting private entries in memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ShieldingKey {
    bytes: [u8; KEY_LEN],
}

impl ShieldingKey {
    pub fn generate(crypto: &dyn CryptoProvider) -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        crypto.fill_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Encrypt `plaintext`, bound to the entry name `label`.
    pub fn shield(
        &self,
        crypto: &dyn CryptoProvider,
        label: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        crypto.aead_encrypt(&self.bytes, plaintext, label.as_bytes())
    }

    /// Decrypt a value produced by [`shield`](Self::shield) for `label`.
    pub fn unshield(
        &self,
        crypto: &dyn CryptoProvider,
        label: &str,
        sealed: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        crypto
            .aead_decrypt(&self.bytes, sealed, label.as_bytes())
            .map(Zeroizing::new)
    }
}

impl std::fmt::Debug for ShieldingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ShieldingKey([REDACTED])")
    }
}
