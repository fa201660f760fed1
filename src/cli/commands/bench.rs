//! `hdvault bench`: calibrate Argon2id on this machine.

use crate::benchmark::{BenchmarkOptions, KdfBenchmark};
use crate::cli::output;
use crate::cli::{settings, Cli};
use crate::clock::MonotonicClock;
use crate::crypto::provider::DefaultCrypto;
use crate::errors::Result;

/// Execute the `bench` command. Reports only; stored defaults are untouched.
pub fn execute(cli: &Cli, target_ms: f64, memory_kib: u32, measure_error: bool) -> Result<()> {
    let (_, settings) = settings(cli)?;
    let options = BenchmarkOptions {
        target_time_ms: target_ms,
        memory_kib,
        parallelism: settings.kdf_parallelism,
        measure_error,
    };

    output::info(&format!(
        "Calibrating Argon2id for {target_ms} ms at {memory_kib} KiB..."
    ));

    let clock = MonotonicClock::new();
    let crypto = DefaultCrypto;
    let result = KdfBenchmark::new(&clock, &crypto).run(&options)?;

    output::print_benchmark(&options, &result);
    output::tip(&format!(
        "Set kdf_target_time_ms = {target_ms} and kdf_memory_kib = {memory_kib} in .hdvault.toml to use this for new vaults."
    ));
    Ok(())
}
