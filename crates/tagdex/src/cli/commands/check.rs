//! Implementation of `tagdex check`.

use std::process::ExitCode;

use tagdex_config::ConfigWarning;

use crate::cli::context::CommandContext;

/// Validates the configuration and reports where data lives.
///
/// Exits non-zero when there are warnings.
pub fn run(ctx: &CommandContext) -> ExitCode {
    println!("Checking configuration...");
    println!();

    if ctx.config_files.is_empty() {
        println!("No configuration files found; using defaults.");
    } else {
        println!("Config files:");
        for path in &ctx.config_files {
            println!("  {}", path.display());
        }
    }
    println!();

    let storage = &ctx.config.storage;
    let status = if storage.index_dir().exists() {
        "ok"
    } else {
        "not created yet"
    };
    println!("Data directory: {}", storage.data_dir.display());
    println!("  index [{status}]");
    println!();

    let warnings = ctx.config.validate();
    if warnings.is_empty() {
        println!("No issues found.");
        return ExitCode::SUCCESS;
    }

    println!("Warnings ({}):", warnings.len());
    for warning in &warnings {
        println!("  - {warning}");
    }
    println!();
    print_hints(&warnings);

    ExitCode::FAILURE
}

/// Prints hints for resolving common warnings.
fn print_hints(warnings: &[ConfigWarning]) {
    let mut hints: Vec<&str> = warnings
        .iter()
        .map(|warning| match warning {
            ConfigWarning::DefaultLimitAboveMax { .. } => {
                "Lower search.default_limit or raise search.max_limit."
            }
            ConfigWarning::NoRequestInterval => {
                "Set upstream.request_interval_ms; the upstream throttles unpaced clients."
            }
            ConfigWarning::ZeroSetting { .. } => "Remove the setting to use its default.",
            ConfigWarning::InvalidUrl { .. } => "URLs must start with http:// or https://.",
        })
        .collect();
    hints.sort_unstable();
    hints.dedup();

    println!("Hints:");
    for hint in hints {
        println!("  - {hint}");
    }
}
