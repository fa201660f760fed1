//! `hdvault init`: create a new, empty vault.

use serde_json::Value;

use crate::cli::output;
use crate::cli::{context, prompt_new_password, Cli};
use crate::errors::Result;
use crate::vault::VaultFactory;

/// Execute the `init` command.
pub fn execute(cli: &Cli, label: Option<&str>) -> Result<()> {
    let factory = VaultFactory::new(context(cli)?);

    // 1. Prompt for a new password (with confirmation).
    let password = prompt_new_password()?;

    // 2. Create the vault; the label lives in the public header.
    let mut vault = factory.create(None)?;
    if let Some(label) = label {
        vault
            .meta_mut()
            .insert("label".to_string(), Value::String(label.to_string()));
    }
    vault.set_password(password.as_bytes())?;
    vault.save()?;

    output::success(&format!("Vault created: {}", vault.id()));
    // Bare id on stdout for scripting.
    println!("{}", vault.id());

    output::tip("Run `hdvault set <ID> <KEY> <VALUE>` to add an entry.");
    output::tip("Keys starting with '#' are private (e.g. #mnemonic).");

    Ok(())
}
