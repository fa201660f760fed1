use clap::Parser;
use hdvault::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    // Diagnostics go to stderr; stdout stays clean for ids and values.
    let filter = EnvFilter::try_from_env("HDVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { ref label } => {
            hdvault::cli::commands::init::execute(&cli, label.as_deref())
        }
        Commands::List => hdvault::cli::commands::list::execute(&cli),
        Commands::Meta { ref id } => hdvault::cli::commands::meta::execute(&cli, id),
        Commands::Set {
            ref id,
            ref key,
            ref value,
        } => hdvault::cli::commands::set::execute(&cli, id, key, value.as_deref()),
        Commands::Get {
            ref id,
            ref key,
            reveal,
        } => hdvault::cli::commands::get::execute(&cli, id, key, reveal),
        Commands::Unset { ref id, ref key } => {
            hdvault::cli::commands::unset::execute(&cli, id, key)
        }
        Commands::Destroy { ref id, force } => {
            hdvault::cli::commands::destroy::execute(&cli, id, force)
        }
        Commands::Bench {
            target_ms,
            memory_kib,
            measure_error,
        } => hdvault::cli::commands::bench::execute(&cli, target_ms, memory_kib, measure_error),
    };

    if let Err(e) = result {
        hdvault::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
