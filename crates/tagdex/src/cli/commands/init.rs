//! Implementation of `tagdex init`.

use std::{
    fs,
    io::{self, Write},
    path::Path,
    process::ExitCode,
};

use tagdex_config::{CONFIG_FILENAME, config_template, global_config_path};

use crate::cli::{args::InitCommand, context::CommandContext};

/// Data directory the template points local configurations at.
const LOCAL_DATA_DIR: &str = ".tagdex/";

/// Writes a commented configuration template.
pub fn run(ctx: &CommandContext, cmd: &InitCommand) -> ExitCode {
    let config_path = if cmd.global {
        let Some(path) = global_config_path() else {
            eprintln!("error: could not determine home directory");
            return ExitCode::FAILURE;
        };
        path
    } else {
        ctx.cwd.join(CONFIG_FILENAME)
    };

    if config_path.exists() && !cmd.force {
        eprintln!(
            "error: configuration file already exists: {}",
            config_path.display()
        );
        eprintln!("use --force to overwrite");
        return ExitCode::FAILURE;
    }

    if let Err(e) = fs::write(&config_path, config_template()) {
        eprintln!("error: failed to write {}: {e}", config_path.display());
        return ExitCode::FAILURE;
    }
    println!("Created {}", config_path.display());

    if !cmd.global && let Err(e) = update_gitignore(&config_path) {
        eprintln!("warning: could not update .gitignore: {e}");
    }
    ExitCode::SUCCESS
}

/// Adds the local data directory to an existing `.gitignore` that lacks it.
fn update_gitignore(config_path: &Path) -> io::Result<()> {
    let Some(parent) = config_path.parent() else {
        return Ok(());
    };
    let gitignore_path = parent.join(".gitignore");
    if !gitignore_path.exists() {
        return Ok(());
    }

    let contents = fs::read_to_string(&gitignore_path)?;
    let bare = LOCAL_DATA_DIR.trim_end_matches('/');
    if contents
        .lines()
        .map(str::trim)
        .any(|line| line == LOCAL_DATA_DIR || line == bare)
    {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new().append(true).open(&gitignore_path)?;
    if !contents.is_empty() && !contents.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "{LOCAL_DATA_DIR}")?;
    println!("Added {LOCAL_DATA_DIR} to .gitignore");
    Ok(())
}
