//! `hdvault destroy`: delete a whole vault.

use dialoguer::Confirm;

use crate::cli::output;
use crate::cli::{context, parse_id, Cli};
use crate::errors::{Result, VaultError};
use crate::vault::VaultFactory;

/// Execute the `destroy` command.
pub fn execute(cli: &Cli, id: &str, force: bool) -> Result<()> {
    let id = parse_id(id)?;
    let factory = VaultFactory::new(context(cli)?);

    if factory.meta(&id)?.is_none() {
        return Err(VaultError::NotFound(format!("vault {id}")));
    }

    // Unless --force is set, ask for confirmation before deleting.
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete vault {id}? This cannot be undone."))
            .default(false)
            .interact()
            .map_err(|e| VaultError::Configuration(format!("confirm prompt: {e}")))?;

        if !confirmed {
            output::info("Cancelled.");
            return Ok(());
        }
    }

    factory.delete(&id)?;
    output::success(&format!("Deleted vault {id}"));
    Ok(())
}
