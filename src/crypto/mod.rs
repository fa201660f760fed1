//! Cryptographic primitives for hdvault.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - Argon2id password-based key derivation (`kdf`)
//! - The machine secret / vault key / shielding key hierarchy (`keys`)
//! - The injectable backend trait and its default implementation (`provider`)

pub mod encryption;
pub mod kdf;
pub mod keys;
pub mod provider;

pub use encryption::{decrypt, encrypt};
pub use kdf::{derive_argon2id, KdfParams};
pub use keys::{MachineSecret, ShieldingKey, VaultKey};
pub use provider::{CryptoProvider, DefaultCrypto};
