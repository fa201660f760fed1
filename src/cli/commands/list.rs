//! `hdvault list`: display all vaults in a table.

use crate::cli::output;
use crate::cli::{context, Cli};
use crate::errors::Result;
use crate::vault::VaultFactory;

/// Execute the `list` command. No password is needed.
pub fn execute(cli: &Cli) -> Result<()> {
    let factory = VaultFactory::new(context(cli)?);

    let mut vaults = Vec::new();
    for id in factory.list()? {
        vaults.push((id, factory.meta(&id)?));
    }

    output::print_vaults_table(&vaults);
    Ok(())
}
