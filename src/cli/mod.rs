//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{self, Context, Settings};
use crate::errors::{Result, VaultError};
use crate::vault::{Vault, VaultFactory};

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Environment variable consulted before prompting for a password.
pub const PASSWORD_ENV: &str = "HDVAULT_PASSWORD";

/// hdvault CLI: password-protected HD-wallet secret vaults.
#[derive(Parser)]
#[command(name = "hdvault", about = "Password-protected HD-wallet secret vaults", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store directory (default: from .hdvault.toml, else .hdvault)
    #[arg(long, global = true, env = "HDVAULT_STORE_DIR")]
    pub store_dir: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new vault and print its id
    Init {
        /// Human-readable label stored in the vault's public metadata
        #[arg(short, long)]
        label: Option<String>,
    },

    /// List all vaults
    List,

    /// Show a vault's public metadata (no password needed)
    Meta {
        /// Vault id
        id: String,
    },

    /// Set an entry (keys starting with '#' are private)
    Set {
        /// Vault id
        id: String,
        /// Entry name (e.g. label, #mnemonic)
        key: String,
        /// Value, JSON or plain text (omit for interactive prompt)
        value: Option<String>,
    },

    /// Get an entry
    Get {
        /// Vault id
        id: String,
        /// Entry name
        key: String,
        /// Print the decrypted value of a private entry
        #[arg(long)]
        reveal: bool,
    },

    /// Remove an entry
    Unset {
        /// Vault id
        id: String,
        /// Entry name
        key: String,
    },

    /// Delete a vault
    Destroy {
        /// Vault id
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Calibrate Argon2id for this machine
    Bench {
        /// Target derivation time in milliseconds
        #[arg(long, default_value = "1000")]
        target_ms: f64,
        /// Argon2 memory cost in KiB
        #[arg(long, default_value = "32768")]
        memory_kib: u32,
        /// Re-measure once and report the relative error
        #[arg(long)]
        measure_error: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Get the vault password, trying in order:
/// 1. `HDVAULT_PASSWORD` env var (CI/CD)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter vault password")
        .interact()
        .map_err(|e| VaultError::Configuration(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation (used during `init`).
///
/// Also respects `HDVAULT_PASSWORD` for scripted/CI usage.
/// Enforces a minimum password length.
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            if pw.len() < MIN_PASSWORD_LEN {
                return Err(VaultError::Configuration(format!(
                    "password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose vault password")
            .with_confirmation(
                "Confirm vault password",
                "Passwords do not match, try again",
            )
            .interact()
            .map_err(|e| VaultError::Configuration(format!("password prompt: {e}")))?;

        if password.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

/// Load `.hdvault.toml` from the working directory, applying `--store-dir`.
pub fn settings(cli: &Cli) -> Result<(std::path::PathBuf, Settings)> {
    let cwd = std::env::current_dir()?;
    let mut settings = Settings::load(&cwd)?;
    if let Some(dir) = &cli.store_dir {
        settings.store_dir = dir.clone();
    }
    Ok((cwd, settings))
}

/// Prepare the process-wide context over the file-backed stores.
pub fn context(cli: &Cli) -> Result<Arc<Context>> {
    let (cwd, settings) = settings(cli)?;
    config::prepare(Some(settings.prepare_options(&cwd)?))
}

/// Open and load vault `id`, prompting for its password.
pub fn open_vault(cli: &Cli, id: &str) -> Result<Vault> {
    let id = parse_id(id)?;
    let factory = VaultFactory::new(context(cli)?);
    // Fail before prompting when the id is unknown.
    if factory.meta(&id)?.is_none() {
        return Err(VaultError::NotFound(format!("vault {id}")));
    }
    let password = prompt_password()?;
    factory.open(Some(id), Some(password.as_bytes()))
}

/// Parse a vault id given on the command line.
pub fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| VaultError::NotFound(format!("'{id}' is not a vault id")))
}

/// Interpret a command-line value: JSON if it parses, plain text otherwise.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_prefer_json() {
        assert_eq!(parse_value("42"), Value::from(42));
        assert_eq!(parse_value(r#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(parse_value("all all all"), Value::from("all all all"));
        assert_eq!(parse_value("\"quoted\""), Value::from("quoted"));
    }

    #[test]
    fn ids_must_be_uuids() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
