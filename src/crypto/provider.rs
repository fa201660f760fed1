//! Pluggable cryptography backend.
//!
//! Every vault operation goes through a [`CryptoProvider`] held by the
//! [`Context`](crate::config::Context), so an embedder can swap in a
//! hardware-backed or audited implementation. [`DefaultCrypto`] uses the
//! RustCrypto `aes-gcm`, `argon2` and `hkdf` crates.

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::encryption;
use super::kdf::{self, KdfParams, KEY_LEN};
use crate::errors::{Result, VaultError};

/// AEAD, KDF, HKDF and CSPRNG primitives.
pub trait CryptoProvider: Send + Sync {
    /// Fill `buf` with cryptographically secure random bytes.
    fn fill_random(&self, buf: &mut [u8]) -> Result<()>;

    /// AES-256-GCM encrypt; returns nonce || ciphertext || tag.
    fn aead_encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// AES-256-GCM decrypt; any failure is [`VaultError::Authentication`].
    fn aead_decrypt(&self, key: &[u8; KEY_LEN], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Argon2id password hash producing a 32-byte key.
    fn argon2id(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<[u8; KEY_LEN]>>;

    /// HKDF-SHA256 extract-and-expand into `okm`.
    fn hkdf(&self, ikm: &[u8], salt: &[u8], info: &[u8], okm: &mut [u8]) -> Result<()>;
}

/// RustCrypto-backed provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCrypto;

impl CryptoProvider for DefaultCrypto {
    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        rand::rng().fill_bytes(buf);
        Ok(())
    }

    fn aead_encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        encryption::encrypt(key, plaintext, aad)
    }

    fn aead_decrypt(&self, key: &[u8; KEY_LEN], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        encryption::decrypt(key, sealed, aad)
    }

    fn argon2id(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        kdf::derive_argon2id(password, salt, params)
    }

    fn hkdf(&self, ikm: &[u8], salt: &[u8], info: &[u8], okm: &mut [u8]) -> Result<()> {
        let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
        hk.expand(info, okm)
            .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))
    }
}
