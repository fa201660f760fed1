//! One module per subcommand; each exposes an `execute` function.

pub mod bench;
pub mod destroy;
pub mod get;
pub mod init;
pub mod list;
pub mod meta;
pub mod set;
pub mod unset;
