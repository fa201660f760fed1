//! Remote vault: run the vault engine on one side of a byte stream and
//! hold only proxies on the other.
//!
//! - Frames and message types (`protocol`)
//! - Ordered call/reply plumbing with fail-closed revocation (`endpoint`)
//! - The engine side (`server`) and the proxy side (`client`)

pub mod client;
pub mod endpoint;
pub mod protocol;
pub mod server;

pub use client::{RemoteVault, RemoteVaultFactory};
pub use endpoint::{serve, CallHandler, Connection, Endpoint};
pub use protocol::{Message, RemoteError, RemoteHandle, WireValue};
pub use server::VaultServer;
