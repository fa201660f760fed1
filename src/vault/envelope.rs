//! Persisted envelope format.
//!
//! One envelope per vault id, a flattened JWE-style JSON object:
//!
//! ```text
//! {
//!   "protected":     base64url(JSON{ alg, enc, argon, meta }),
//!   "encrypted_key": base64url(nonce || GCM(VaultKey, CEK)),
//!   "iv":            base64url(12-byte content nonce),
//!   "ciphertext":    base64url(GCM(CEK, plaintext, aad = protected)),
//!   "tag":           base64url(16-byte content tag)
//! }
//! ```
//!
//! - **protected**: readable without any key, so `meta` and the vault's
//!   own KDF parameters can be listed before a password is known.
//! - **encrypted_key**: a fresh random content-encryption key (CEK) per
//!   save, wrapped under the password-derived `VaultKey`.
//! - The ASCII of `protected` is the content AAD, so editing the header
//!   invalidates the ciphertext.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::crypto::encryption::{join_sealed, split_sealed};
use crate::crypto::kdf::{KdfParams, KEY_LEN};
use crate::crypto::keys::VaultKey;
use crate::crypto::provider::CryptoProvider;
use crate::errors::{Result, VaultError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Key management algorithm: AES-256-GCM key wrap.
pub const ALG: &str = "A256GCMKW";

/// Content encryption algorithm.
pub const ENC: &str = "A256GCM";

/// Vault metadata: an ordered string → JSON value map.
pub type Meta = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// ProtectedHeader
// ---------------------------------------------------------------------------

/// The part of an envelope anyone can read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    pub enc: String,

    /// The vault's own KDF parameters, frozen at first save.
    /// Missing only in envelopes this crate did not write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argon: Option<KdfParams>,

    #[serde(default)]
    pub meta: Meta,
}

impl ProtectedHeader {
    pub fn new(argon: KdfParams, meta: Meta) -> Self {
        Self {
            alg: ALG.to_string(),
            enc: ENC.to_string(),
            argon: Some(argon),
            meta,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub protected: String,
    pub encrypted_key: String,
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

impl Envelope {
    /// Encrypt `plaintext` under a fresh CEK wrapped by `vault_key`.
    pub fn seal(
        crypto: &dyn CryptoProvider,
        vault_key: &VaultKey,
        header: &ProtectedHeader,
        plaintext: &[u8],
    ) -> Result<Self> {
        let header_json = serde_json::to_vec(header)
            .map_err(|e| VaultError::Serialization(format!("header: {e}")))?;
        let protected = BASE64URL.encode(header_json);

        let mut cek = Zeroizing::new([0u8; KEY_LEN]);
        crypto.fill_random(&mut cek[..])?;
        let encrypted_key = vault_key.wrap(crypto, &cek)?;

        let sealed = crypto.aead_encrypt(&cek, plaintext, protected.as_bytes())?;
        let (iv, ciphertext, tag) = split_sealed(&sealed)?;

        Ok(Self {
            encrypted_key: BASE64URL.encode(encrypted_key),
            iv: BASE64URL.encode(iv),
            ciphertext: BASE64URL.encode(ciphertext),
            tag: BASE64URL.encode(tag),
            protected,
        })
    }

    /// Decrypt the payload. A wrong `vault_key` or any tampering is
    /// [`VaultError::Authentication`].
    pub fn open(
        &self,
        crypto: &dyn CryptoProvider,
        vault_key: &VaultKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let header = self.header()?;
        if header.alg != ALG || header.enc != ENC {
            return Err(VaultError::InvalidFormat(format!(
                "unsupported envelope algorithms {}/{}",
                header.alg, header.enc
            )));
        }

        let encrypted_key = decode_field("encrypted_key", &self.encrypted_key)?;
        let cek = vault_key.unwrap_key(crypto, &encrypted_key)?;

        let sealed = join_sealed(
            &decode_field("iv", &self.iv)?,
            &decode_field("ciphertext", &self.ciphertext)?,
            &decode_field("tag", &self.tag)?,
        )?;

        crypto
            .aead_decrypt(&cek, &sealed, self.protected.as_bytes())
            .map(Zeroizing::new)
    }

    /// Decode the protected header. Needs no key.
    pub fn header(&self) -> Result<ProtectedHeader> {
        let raw = decode_field("protected", &self.protected)?;
        serde_json::from_slice(&raw)
            .map_err(|e| VaultError::InvalidFormat(format!("protected header JSON: {e}")))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| VaultError::Serialization(format!("envelope: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VaultError::InvalidFormat(format!("envelope JSON: {e}")))
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    BASE64URL
        .decode(value)
        .map_err(|e| VaultError::InvalidFormat(format!("{name}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
