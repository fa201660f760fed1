//! `hdvault get`: print a single entry.

use crate::cli::output;
use crate::cli::{open_vault, Cli};
use crate::errors::{Result, VaultError};
use crate::revocable::Revoker;
use crate::vault::EntryKey;

/// Execute the `get` command.
///
/// Private entries print as a placeholder unless `--reveal` is given.
pub fn execute(cli: &Cli, id: &str, key: &str, reveal: bool) -> Result<()> {
    let mut vault = open_vault(cli, id)?;

    let value = vault
        .get(key)?
        .ok_or_else(|| VaultError::NotFound(format!("entry '{key}'")))?;

    if reveal && EntryKey::parse(key).is_private() {
        let revoker = Revoker::new();
        let plain = vault.unwrap(&revoker)?.get(key)?;
        if let Some(plain) = plain {
            match plain.get()? {
                serde_json::Value::String(s) => println!("{s}"),
                other => println!("{other}"),
            }
        }
        revoker.revoke();
    } else {
        println!("{}", output::describe_value(&value));
    }

    vault.seal();
    Ok(())
}
