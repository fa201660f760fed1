//! Vault module: password-protected secret storage.
//!
//! Layers, outermost first:
//! - `Vault`: public/private entries, seal/unwrap, revocation (`partitioned`)
//! - `CollectionVault`: ordered key → value payload (`collection`)
//! - `RawVault`: key derivation and envelope persistence (`raw`, `envelope`)
//!
//! `VaultFactory` (`factory`) is the usual entry point; `Registry`
//! (`registry`) and the entry types (`entry`) plug private-key handling in.

pub mod collection;
pub mod entry;
pub mod envelope;
pub mod factory;
pub mod partitioned;
pub mod raw;
pub mod registry;

// Re-export the most commonly used items.
pub use collection::CollectionVault;
pub use entry::{
    generate_request, EntryKey, IsolationEngine, PrivateKind, SecretHandle, VaultValue,
};
pub use envelope::{Envelope, Meta, ProtectedHeader};
pub use factory::VaultFactory;
pub use partitioned::{Unwrapped, Vault};
pub use raw::RawVault;
pub use registry::Registry;
