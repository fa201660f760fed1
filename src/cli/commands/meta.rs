//! `hdvault meta`: show a vault's public metadata.

use crate::cli::output;
use crate::cli::{context, parse_id, Cli};
use crate::errors::{Result, VaultError};
use crate::vault::VaultFactory;

/// Execute the `meta` command. Reads the header only; no password needed.
pub fn execute(cli: &Cli, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let factory = VaultFactory::new(context(cli)?);

    let meta = factory
        .meta(&id)?
        .ok_or_else(|| VaultError::NotFound(format!("vault {id}")))?;

    output::print_meta_table(&meta);
    Ok(())
}
