pub mod benchmark;
pub mod cli;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod remote;
pub mod revocable;
pub mod store;
pub mod vault;

pub use config::prepare;
