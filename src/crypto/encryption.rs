//! AES-256-GCM authenticated encryption.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce and
//! prepends it to the ciphertext.  `decrypt` splits the nonce back out
//! before decrypting.
//!
//! Layout of the returned byte buffer:
//!   [ 12-byte nonce | ciphertext | 16-byte auth tag ]
//!
//! Associated data (`aad`) is authenticated but not encrypted; the
//! envelope uses it to bind the protected header to the ciphertext.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};

use crate::errors::{Result, VaultError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` with a 32-byte `key`, authenticating `aad`.
///
/// Returns nonce || ciphertext || tag.
pub fn encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Crypto(format!("invalid key length: {e}")))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| VaultError::Crypto(format!("encryption error: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data that was produced by `encrypt` with the same `aad`.
///
/// Any failure (short input, wrong key, tampered bytes, different aad) is
/// reported as [`VaultError::Authentication`].
pub fn decrypt(key: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::Authentication);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::Authentication)?;

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| VaultError::Authentication)
}

/// Split a sealed buffer into `(nonce, ciphertext, tag)`.
pub fn split_sealed(sealed: &[u8]) -> Result<(&[u8], &[u8], &[u8])> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::InvalidFormat("sealed buffer too short".into()));
    }
    let (nonce, rest) = sealed.split_at(NONCE_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
    Ok((nonce, ciphertext, tag))
}

/// Reassemble the parts produced by [`split_sealed`].
pub fn join_sealed(nonce: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "expected {NONCE_LEN}-byte iv and {TAG_LEN}-byte tag, got {} and {}",
            nonce.len(),
            tag.len()
        )));
    }
    let mut sealed = Vec::with_capacity(nonce.len() + ciphertext.len() + tag.len());
    sealed.extend_from_slice(nonce);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    Ok(sealed)
}
