//! `hdvault set`: add or update an entry in a vault.

use std::io::{self, IsTerminal, Read};

use crate::cli::output;
use crate::cli::{open_vault, parse_value, Cli};
use crate::errors::{Result, VaultError};
use crate::vault::EntryKey;

/// Execute the `set` command.
pub fn execute(cli: &Cli, id: &str, key: &str, value: Option<&str>) -> Result<()> {
    let private = EntryKey::parse(key).is_private();

    // Determine the value from one of three sources.
    let raw = if let Some(v) = value {
        // Source 1: Inline value on the command line.
        if private {
            output::warning("Value provided on command line; it may appear in shell history.");
        }
        v.to_string()
    } else if !io::stdin().is_terminal() {
        // Source 2: Piped input (stdin is not a terminal).
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf.trim_end().to_string()
    } else {
        // Source 3: Interactive secure prompt (default).
        dialoguer::Password::new()
            .with_prompt(format!("Enter value for {key}"))
            .interact()
            .map_err(|e| VaultError::Configuration(format!("input prompt: {e}")))?
    };

    let mut vault = open_vault(cli, id)?;
    let existed = vault.get(key)?.is_some();
    vault.set(key, parse_value(&raw))?;
    vault.save()?;

    let verb = if existed { "updated" } else { "added" };
    output::success(&format!(
        "Entry '{key}' {verb} ({} total)",
        vault.keys()?.len()
    ));

    Ok(())
}
