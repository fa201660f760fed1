//! `hdvault unset`: remove an entry from a vault.

use crate::cli::output;
use crate::cli::{open_vault, Cli};
use crate::errors::{Result, VaultError};

/// Execute the `unset` command.
pub fn execute(cli: &Cli, id: &str, key: &str) -> Result<()> {
    let mut vault = open_vault(cli, id)?;

    if !vault.delete(key)? {
        return Err(VaultError::NotFound(format!("entry '{key}'")));
    }
    vault.save()?;

    output::success(&format!("Removed entry '{key}'"));
    Ok(())
}
