//! Password-based key derivation using Argon2id.
//!
//! Argon2id is a memory-hard KDF that protects against brute-force and
//! GPU-based attacks.  The tuning lives in [`KdfParams`]; a vault freezes
//! its own copy in the envelope header the first time a password is set,
//! so changing the process default never breaks existing vaults.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};

/// Length of the derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Argon2 needs at least 8 KiB of memory per lane.
pub const MIN_MEMORY_KIB_PER_LANE: u32 = 8;

/// Argon2id tuning parameters.
///
/// Serialized as `{parallelism, memorySize, iterations}`, the shape stored
/// in the envelope's `argon` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Parallelism lanes.
    pub parallelism: u32,
    /// Memory cost in KiB.
    #[serde(rename = "memorySize")]
    pub memory_kib: u32,
    /// Number of passes over memory.
    pub iterations: u32,
}

impl KdfParams {
    pub fn new(parallelism: u32, memory_kib: u32, iterations: u32) -> Self {
        Self {
            parallelism,
            memory_kib,
            iterations,
        }
    }

    /// Reject parameter sets Argon2 cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism < 1 {
            return Err(VaultError::KeyDerivationFailed(
                "Argon2 parallelism must be at least 1".into(),
            ));
        }
        if self.iterations < 1 {
            return Err(VaultError::KeyDerivationFailed(
                "Argon2 iterations must be at least 1".into(),
            ));
        }
        let min_memory = MIN_MEMORY_KIB_PER_LANE.saturating_mul(self.parallelism);
        if self.memory_kib < min_memory {
            return Err(VaultError::KeyDerivationFailed(format!(
                "Argon2 memorySize must be at least {min_memory} KiB (got {})",
                self.memory_kib
            )));
        }
        Ok(())
    }
}

/// Derive a 32-byte key with explicit Argon2id parameters.
///
/// The same password + salt + params always produce the same key.
pub fn derive_argon2id(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    params.validate()?;

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|e| VaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_serialize_with_envelope_field_names() {
        let params = KdfParams::new(1, 8, 3);
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"parallelism": 1, "memorySize": 8, "iterations": 3})
        );
    }

    #[test]
    fn validate_rejects_degenerate_params() {
        assert!(KdfParams::new(0, 8, 1).validate().is_err());
        assert!(KdfParams::new(1, 8, 0).validate().is_err());
        assert!(KdfParams::new(2, 8, 1).validate().is_err());
        assert!(KdfParams::new(2, 16, 1).validate().is_ok());
    }

    #[test]
    fn derive_is_deterministic() {
        let params = KdfParams::new(1, 8, 1);
        let salt = [7u8; 16];
        let a = derive_argon2id(b"pw", &salt, &params).unwrap();
        let b = derive_argon2id(b"pw", &salt, &params).unwrap();
        assert_eq!(*a, *b);
    }
}
