//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;
use uuid::Uuid;

use crate::benchmark::{BenchmarkOptions, BenchmarkResult};
use crate::vault::{Meta, VaultValue};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of vaults (Id, Label).
pub fn print_vaults_table(vaults: &[(Uuid, Option<Meta>)]) {
    if vaults.is_empty() {
        info("No vaults yet.");
        tip("Run `hdvault init` to create your first vault.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "Label"]);

    for (id, meta) in vaults {
        let label = meta
            .as_ref()
            .and_then(|m| m.get("label"))
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        table.add_row(vec![id.to_string(), label.to_string()]);
    }

    println!("{table}");
}

/// Print a vault's metadata as a two-column table.
pub fn print_meta_table(meta: &Meta) {
    if meta.is_empty() {
        info("This vault has no metadata.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Value"]);
    for (key, value) in meta {
        table.add_row(vec![key.clone(), value.to_string()]);
    }
    println!("{table}");
}

/// Render an entry without ever printing private plaintext.
pub fn describe_value(value: &VaultValue) -> String {
    match value {
        VaultValue::Plain(serde_json::Value::String(s)) => s.clone(),
        VaultValue::Plain(other) => other.to_string(),
        VaultValue::Handle(handle) => format!("<{} {}>", handle.kind(), handle.public()),
        VaultValue::Unsupported { .. } => "<private entry>".to_string(),
    }
}

/// Print benchmark results as a table.
pub fn print_benchmark(options: &BenchmarkOptions, result: &BenchmarkResult) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Measure", "Value"]);

    let d = &result.durations;
    table.add_row(vec!["memory".to_string(), format!("{} KiB", options.memory_kib)]);
    table.add_row(vec!["iterations".to_string(), result.iterations.to_string()]);
    table.add_row(vec!["bits".to_string(), format!("{:.2}", result.bits)]);
    table.add_row(vec!["ms / iteration".to_string(), format!("{:.3}", d.ms_per_iteration)]);
    table.add_row(vec!["setup".to_string(), format!("{:.1} ms", d.setup)]);
    table.add_row(vec!["warm-up".to_string(), format!("{:.1} ms", d.warmup)]);
    table.add_row(vec!["overall".to_string(), format!("{:.1} ms", d.overall)]);
    if let Some(error) = result.error {
        table.add_row(vec!["error".to_string(), format!("{:+.1}%", error * 100.0)]);
    }

    println!("{table}");
}
